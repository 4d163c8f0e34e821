// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Arena-backed skeleton tree.

Nodes live in a `Vec` and are addressed by slot; a parallel parent-pointer
array holds the tree structure and the children index is derived from it on
every parent change, so the two can never disagree. Only the records
`(node, parent)` are serialized, the index is rebuilt on load.
*/

use super::node::{NeuriteType, NodeId, SkeletonNode};
use crate::error::{ReconError, ReconResult};
use crate::volume::physical_distance;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphRecord", try_from = "GraphRecord")]
pub struct SkeletonGraph {
    nodes: Vec<SkeletonNode>,
    parents: Vec<Option<usize>>,
    /// Derived: always the exact inverse of `parents`, each list sorted by node id
    children: Vec<Vec<usize>>,
    slots: AHashMap<NodeId, usize>,
    frozen: bool,
}

/// Persisted form: the parent map only
#[derive(Serialize, Deserialize)]
struct GraphRecord {
    nodes: Vec<(SkeletonNode, Option<NodeId>)>,
    frozen: bool,
}

impl From<SkeletonGraph> for GraphRecord {
    fn from(graph: SkeletonGraph) -> Self {
        let nodes = graph
            .nodes
            .iter()
            .zip(&graph.parents)
            .map(|(node, parent)| (*node, parent.map(|p| graph.nodes[p].id)))
            .collect();
        GraphRecord {
            nodes,
            frozen: graph.frozen,
        }
    }
}

impl TryFrom<GraphRecord> for SkeletonGraph {
    type Error = ReconError;

    fn try_from(record: GraphRecord) -> Result<Self, Self::Error> {
        let mut graph = SkeletonGraph::with_capacity(record.nodes.len());
        for (node, _) in &record.nodes {
            graph.add_node(*node)?;
        }
        for (node, parent) in &record.nodes {
            if parent.is_some() {
                graph.set_parent(node.id, *parent)?;
            }
        }
        if record.frozen {
            graph.freeze()?;
        }
        Ok(graph)
    }
}

impl SkeletonGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            parents: Vec::with_capacity(capacity),
            children: Vec::with_capacity(capacity),
            slots: AHashMap::with_capacity(capacity),
            frozen: false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    fn slot(&self, id: NodeId) -> ReconResult<usize> {
        self.slots
            .get(&id)
            .copied()
            .ok_or_else(|| ReconError::MalformedInput(format!("unknown node id {}", id)))
    }

    fn ensure_mutable(&self) -> ReconResult<()> {
        if self.frozen {
            return Err(ReconError::Internal(
                "skeleton graph is frozen and cannot be modified".to_string(),
            ));
        }
        Ok(())
    }

    /// Insert a detached node (no parent yet)
    pub fn add_node(&mut self, node: SkeletonNode) -> ReconResult<()> {
        self.ensure_mutable()?;
        if node.id.0 == 0 {
            return Err(ReconError::MalformedInput(
                "node ids must be positive".to_string(),
            ));
        }
        if self.slots.contains_key(&node.id) {
            return Err(ReconError::MalformedInput(format!(
                "duplicate node id {}",
                node.id
            )));
        }
        let slot = self.nodes.len();
        self.slots.insert(node.id, slot);
        self.nodes.push(node);
        self.parents.push(None);
        self.children.push(Vec::new());
        Ok(())
    }

    /// Re-point `child` at `parent` (or detach it with `None`), keeping the
    /// children index in sync.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> ReconResult<()> {
        self.ensure_mutable()?;
        let child_slot = self.slot(child)?;
        let parent_slot = match parent {
            Some(p) if p == child => {
                return Err(ReconError::TopologyViolation(format!(
                    "node {} cannot be its own parent",
                    child
                )))
            }
            Some(p) => Some(self.slot(p)?),
            None => None,
        };

        if let Some(old) = self.parents[child_slot] {
            self.children[old].retain(|&s| s != child_slot);
        }
        self.parents[child_slot] = parent_slot;
        if let Some(p) = parent_slot {
            let nodes = &self.nodes;
            let list = &mut self.children[p];
            let at = list.partition_point(|&s| nodes[s].id < child);
            list.insert(at, child_slot);
        }
        Ok(())
    }

    /// Change a node's compartment type, returning the previous one.
    /// Structure is untouched.
    pub fn set_kind(&mut self, id: NodeId, kind: NeuriteType) -> ReconResult<NeuriteType> {
        self.ensure_mutable()?;
        let slot = self.slot(id)?;
        let previous = self.nodes[slot].kind;
        self.nodes[slot].kind = kind;
        Ok(previous)
    }

    pub fn node(&self, id: NodeId) -> Option<&SkeletonNode> {
        self.slots.get(&id).map(|&s| &self.nodes[s])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let slot = *self.slots.get(&id)?;
        self.parents[slot].map(|p| self.nodes[p].id)
    }

    /// Children of `id` in ascending id order
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let slots: &[usize] = self
            .slots
            .get(&id)
            .map(|&s| self.children[s].as_slice())
            .unwrap_or(&[]);
        slots.iter().map(move |&s| self.nodes[s].id)
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.slots
            .get(&id)
            .map(|&s| self.children[s].len())
            .unwrap_or(0)
    }

    /// Number of tree edges touching the node
    pub fn degree(&self, id: NodeId) -> usize {
        let parent_edge = usize::from(self.parent(id).is_some());
        self.child_count(id) + parent_edge
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &SkeletonNode> {
        self.nodes.iter()
    }

    /// Every node without a parent
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .zip(&self.parents)
            .filter(|(_, p)| p.is_none())
            .map(|(n, _)| n.id)
            .collect()
    }

    /// The root, if there is exactly one
    pub fn root(&self) -> Option<NodeId> {
        match self.roots().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Physical length of the edge to the parent
    pub fn edge_length(&self, id: NodeId) -> Option<f64> {
        let node = self.node(id)?;
        let parent = self.node(self.parent(id)?)?;
        Some(physical_distance(&node.position, &parent.position))
    }

    /// Breadth-first order from `start`, children visited in ascending id order.
    /// Only nodes reachable from `start` are returned.
    pub fn breadth_first_from(&self, start: NodeId) -> Vec<NodeId> {
        let Some(&start_slot) = self.slots.get(&start) else {
            return Vec::new();
        };
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([start_slot]);
        visited[start_slot] = true;
        while let Some(slot) = queue.pop_front() {
            order.push(self.nodes[slot].id);
            for &child in &self.children[slot] {
                if !visited[child] {
                    visited[child] = true;
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Breadth-first order from the unique root
    pub fn breadth_first(&self) -> ReconResult<Vec<NodeId>> {
        let root = self.require_root()?;
        Ok(self.breadth_first_from(root))
    }

    fn require_root(&self) -> ReconResult<NodeId> {
        let roots = self.roots();
        match roots.as_slice() {
            [only] => Ok(*only),
            [] if self.nodes.is_empty() => Err(ReconError::TopologyViolation(
                "skeleton graph is empty".to_string(),
            )),
            _ => Err(ReconError::TopologyViolation(format!(
                "expected exactly one root, found {}",
                roots.len()
            ))),
        }
    }

    /// Check the tree invariants: one soma root, children index consistent,
    /// every node reached exactly once from the root, sane attributes.
    pub fn validate(&self) -> ReconResult<()> {
        let root = self.require_root()?;
        let root_kind = self.nodes[self.slot(root)?].kind;
        if root_kind != NeuriteType::Soma {
            return Err(ReconError::TopologyViolation(format!(
                "root node {} is {:?}, expected soma",
                root, root_kind
            )));
        }

        let mut linked = 0usize;
        for (slot, list) in self.children.iter().enumerate() {
            for &child in list {
                if self.parents[child] != Some(slot) {
                    return Err(ReconError::Internal(format!(
                        "children index out of sync at node {}",
                        self.nodes[slot].id
                    )));
                }
            }
            linked += list.len();
        }
        let with_parent = self.parents.iter().filter(|p| p.is_some()).count();
        if linked != with_parent {
            return Err(ReconError::Internal(
                "children index does not cover every parent link".to_string(),
            ));
        }

        let reached = self.breadth_first_from(root).len();
        if reached != self.nodes.len() {
            return Err(ReconError::TopologyViolation(format!(
                "{} of {} nodes are not reachable from root {} (cycle or detached fragment)",
                self.nodes.len() - reached,
                self.nodes.len(),
                root
            )));
        }

        for node in &self.nodes {
            if !node.radius.is_finite() || node.radius < 0.0 {
                return Err(ReconError::MalformedInput(format!(
                    "node {} has invalid radius {}",
                    node.id, node.radius
                )));
            }
            if node.position.iter().any(|c| !c.is_finite()) {
                return Err(ReconError::MalformedInput(format!(
                    "node {} has a non-finite coordinate",
                    node.id
                )));
            }
        }
        Ok(())
    }

    /// Validate and forbid any further mutation
    pub fn freeze(&mut self) -> ReconResult<()> {
        self.validate()?;
        self.frozen = true;
        Ok(())
    }

    /// Path distance from the root along tree edges, for every node
    pub fn geodesic_distances(&self) -> ReconResult<AHashMap<NodeId, f64>> {
        let order = self.breadth_first()?;
        let mut distances = AHashMap::with_capacity(order.len());
        for id in order {
            let distance = match self.parent(id) {
                Some(parent) => {
                    distances.get(&parent).copied().unwrap_or(0.0)
                        + self.edge_length(id).unwrap_or(0.0)
                }
                None => 0.0,
            };
            distances.insert(id, distance);
        }
        Ok(distances)
    }

    /// Sum of all edge lengths
    pub fn cable_length(&self) -> f64 {
        self.nodes
            .iter()
            .filter_map(|n| self.edge_length(n.id))
            .sum()
    }
}
