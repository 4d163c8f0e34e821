// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Label volume → uncorrected skeleton tree.
//!
//! Stages, in order: foreground components, per-class thinning, radius
//! estimation, 26-adjacency between centerline points, bridging of fragments
//! of different classes, root selection on the main soma, level-wise
//! breadth-first parent assignment and spur pruning.

use crate::components::{extract_components, shifted, ComponentSet, OFFSETS_26};
use crate::radius::radii;
use crate::thinning::skeletonize;
use ahash::AHashMap;
use autorecon_config::GraphConfig;
use autorecon_structures::{
    physical_distance, LabelVolume, NeuriteType, NodeId, Position, ReconError, ReconResult,
    SkeletonGraph, SkeletonNode, VoxelClass, VoxelIndex, VoxelSpacing,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use tracing::{debug, info};

/// Edge costs closer than this are treated as equal
const COST_EPSILON: f64 = 1e-12;

/// What the builder kept and threw away for one specimen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub soma_components: usize,
    pub axon_components: usize,
    pub dendrite_components: usize,
    pub discarded_components: usize,
    pub centerline_points: usize,
    pub fragments: usize,
    pub bridges: usize,
    pub unreachable_dropped: usize,
    pub spurs_pruned: usize,
    pub nodes: usize,
}

#[derive(Debug, Clone)]
struct CenterlinePoint {
    class: VoxelClass,
    component: u32,
    position: Position,
    radius: f64,
}

/// Centerline points with undirected weighted edges
#[derive(Debug, Default)]
struct PointGraph {
    points: Vec<CenterlinePoint>,
    edges: Vec<Vec<(usize, f64)>>,
}

impl PointGraph {
    fn push(&mut self, point: CenterlinePoint) -> usize {
        self.points.push(point);
        self.edges.push(Vec::new());
        self.points.len() - 1
    }

    fn connect(&mut self, a: usize, b: usize, cost: f64) {
        self.edges[a].push((b, cost));
        self.edges[b].push((a, cost));
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    /// Connected pieces, each sorted by point index
    fn fragments(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.len()];
        let mut fragments = Vec::new();
        let mut queue = VecDeque::new();
        for start in 0..self.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            queue.push_back(start);
            let mut members = Vec::new();
            while let Some(u) = queue.pop_front() {
                members.push(u);
                for &(v, _) in &self.edges[u] {
                    if !seen[v] {
                        seen[v] = true;
                        queue.push_back(v);
                    }
                }
            }
            members.sort_unstable();
            fragments.push(members);
        }
        fragments
    }

    /// Longest shortest-path distance from `source` to any point of `members`,
    /// walking only through `members`
    fn eccentricity(&self, source: usize, members: &AHashMap<usize, usize>) -> f64 {
        let mut distance = vec![f64::INFINITY; members.len()];
        let mut heap = BinaryHeap::new();
        if let Some(&local) = members.get(&source) {
            distance[local] = 0.0;
            heap.push(Frontier { cost: 0.0, index: source });
        }
        while let Some(Frontier { cost, index }) = heap.pop() {
            let Some(&local) = members.get(&index) else {
                continue;
            };
            if cost > distance[local] {
                continue;
            }
            for &(next, edge) in &self.edges[index] {
                let Some(&next_local) = members.get(&next) else {
                    continue;
                };
                let candidate = cost + edge;
                if candidate < distance[next_local] {
                    distance[next_local] = candidate;
                    heap.push(Frontier {
                        cost: candidate,
                        index: next,
                    });
                }
            }
        }
        distance.into_iter().fold(0.0, f64::max)
    }

    /// Point of `component` with minimum eccentricity (ties → lowest index)
    fn choose_root(&self, component: u32) -> ReconResult<usize> {
        let members: AHashMap<usize, usize> = self
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.component == component)
            .enumerate()
            .map(|(local, (index, _))| (index, local))
            .collect();
        let mut candidates: Vec<usize> = members.keys().copied().collect();
        candidates.sort_unstable();

        let mut best: Option<(usize, f64)> = None;
        for index in candidates {
            let eccentricity = self.eccentricity(index, &members);
            let improves = match best {
                Some((_, e)) => eccentricity < e - COST_EPSILON,
                None => true,
            };
            if improves {
                best = Some((index, eccentricity));
            }
        }
        best.map(|(index, _)| index).ok_or_else(|| {
            ReconError::Internal(format!(
                "soma component {} has no centerline points",
                component
            ))
        })
    }

    /// Breadth-first levels from `root`. A newly reached point takes its
    /// cheapest edge into the previous level as parent, ties going to the
    /// earlier-ranked parent; every other edge is dropped.
    fn level_tree(&self, root: usize) -> Tree {
        let n = self.len();
        let mut rank: Vec<Option<usize>> = vec![None; n];
        let mut level_of = vec![usize::MAX; n];
        let mut parent = vec![None; n];
        let mut cost = vec![0.0; n];

        rank[root] = Some(0);
        level_of[root] = 0;
        let mut order = vec![root];
        let mut level = vec![root];
        let mut depth = 0;

        while !level.is_empty() {
            let mut next = Vec::new();
            for &u in &level {
                for &(v, _) in &self.edges[u] {
                    if level_of[v] == usize::MAX {
                        level_of[v] = depth + 1;
                        next.push(v);
                    }
                }
            }

            for &v in &next {
                let mut best: Option<(usize, f64)> = None;
                for &(u, c) in &self.edges[v] {
                    if level_of[u] != depth {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((bu, bc)) => {
                            c < bc - COST_EPSILON
                                || ((c - bc).abs() <= COST_EPSILON && rank[u] < rank[bu])
                        }
                    };
                    if better {
                        best = Some((u, c));
                    }
                }
                if let Some((u, c)) = best {
                    parent[v] = Some(u);
                    cost[v] = c;
                }
            }

            next.sort_by_key(|&v| (parent[v].and_then(|p| rank[p]), v));
            for &v in &next {
                rank[v] = Some(order.len());
                order.push(v);
            }
            level = next;
            depth += 1;
        }

        Tree {
            order,
            parent,
            cost,
        }
    }
}

/// Min-heap entry for Dijkstra
#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    index: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Parent pointers over point indices, `order` in breadth-first rank
#[derive(Debug)]
struct Tree {
    order: Vec<usize>,
    parent: Vec<Option<usize>>,
    cost: Vec<f64>,
}

impl Tree {
    fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.parent.len()];
        for &v in &self.order {
            if let Some(p) = self.parent[v] {
                children[p].push(v);
            }
        }
        children
    }

    /// Remove leaf paths shorter than `min_length` that hang off a branch
    /// point. When every branch of a point is that short, the longest stays.
    fn prune_spurs(&mut self, min_length: f64) -> usize {
        if min_length <= 0.0 {
            return 0;
        }
        let children = self.children();
        let leaf_path = |start: usize| -> Option<(f64, Vec<usize>)> {
            let mut path = vec![start];
            let mut length = self.cost[start];
            let mut current = start;
            loop {
                match children[current].as_slice() {
                    [] => return Some((length, path)),
                    [only] => {
                        current = *only;
                        length += self.cost[current];
                        path.push(current);
                    }
                    _ => return None,
                }
            }
        };

        let mut remove = vec![false; self.parent.len()];
        let mut pruned = 0;
        for &branch in &self.order {
            if children[branch].len() < 2 {
                continue;
            }
            let mut spurs: Vec<(f64, Vec<usize>)> = children[branch]
                .iter()
                .filter_map(|&c| leaf_path(c))
                .filter(|(length, _)| *length < min_length)
                .collect();
            if spurs.len() == children[branch].len() {
                let mut longest = 0;
                for (i, (length, _)) in spurs.iter().enumerate() {
                    if *length > spurs[longest].0 {
                        longest = i;
                    }
                }
                spurs.remove(longest);
            }
            for (_, path) in spurs {
                for point in path {
                    remove[point] = true;
                }
                pruned += 1;
            }
        }
        self.order.retain(|&v| !remove[v]);
        pruned
    }

    /// Ids 1..n follow breadth-first rank, so parents always have smaller ids
    fn into_skeleton(self, graph: &PointGraph) -> ReconResult<SkeletonGraph> {
        let mut ids: Vec<Option<NodeId>> = vec![None; self.parent.len()];
        for (rank, &v) in self.order.iter().enumerate() {
            ids[v] = Some(NodeId(rank as u32 + 1));
        }

        let mut skeleton = SkeletonGraph::with_capacity(self.order.len());
        for &v in &self.order {
            let point = &graph.points[v];
            let kind = NeuriteType::try_from(point.class).map_err(|class| {
                ReconError::Internal(format!("{:?} voxel on a centerline", class))
            })?;
            let id = ids[v].ok_or_else(|| ReconError::Internal("unranked node".to_string()))?;
            skeleton.add_node(SkeletonNode::new(id, kind, point.position, point.radius))?;
        }
        for &v in &self.order {
            if let (Some(id), Some(p)) = (ids[v], self.parent[v]) {
                let parent_id = ids[p].ok_or_else(|| {
                    ReconError::Internal(format!("parent of node {} was pruned", id))
                })?;
                skeleton.set_parent(id, Some(parent_id))?;
            }
        }
        Ok(skeleton)
    }
}

/// Bounding box of a fragment, for cheap rejection of far bridge pairs
#[derive(Debug)]
struct FragmentBox {
    class: VoxelClass,
    min: Position,
    max: Position,
    max_radius: f64,
}

impl FragmentBox {
    fn of(graph: &PointGraph, members: &[usize]) -> Self {
        let mut bbox = FragmentBox {
            class: graph.points[members[0]].class,
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
            max_radius: 0.0,
        };
        for &i in members {
            let point = &graph.points[i];
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(point.position[axis]);
                bbox.max[axis] = bbox.max[axis].max(point.position[axis]);
            }
            bbox.max_radius = bbox.max_radius.max(point.radius);
        }
        bbox
    }

    fn gap(&self, other: &FragmentBox) -> f64 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let d = (self.min[axis] - other.max[axis])
                .max(other.min[axis] - self.max[axis])
                .max(0.0);
            sum += d * d;
        }
        sum.sqrt()
    }
}

/// Turns a [`LabelVolume`] into an uncorrected [`SkeletonGraph`]
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn build(&self, labels: &LabelVolume) -> ReconResult<(SkeletonGraph, BuildSummary)> {
        let spacing = labels.spacing();
        let set = extract_components(
            labels,
            self.config.min_foreground_confidence,
            self.config.min_component_voxels,
            self.config.min_soma_voxels,
        );
        let mut summary = BuildSummary {
            soma_components: set.of_class(VoxelClass::Soma).count(),
            axon_components: set.of_class(VoxelClass::Axon).count(),
            dendrite_components: set.of_class(VoxelClass::Dendrite).count(),
            discarded_components: set.discarded,
            ..BuildSummary::default()
        };
        debug!(
            target: "autorecon-skeleton",
            "[BUILD] {} soma, {} axon, {} dendrite components ({} discarded)",
            summary.soma_components,
            summary.axon_components,
            summary.dendrite_components,
            summary.discarded_components
        );

        let root_component = set
            .of_class(VoxelClass::Soma)
            .max_by(|a, b| a.len().cmp(&b.len()).then(b.id.cmp(&a.id)))
            .map(|c| c.id)
            .ok_or_else(|| {
                ReconError::TopologyViolation(
                    "no soma voxels survive the foreground mask".to_string(),
                )
            })?;

        let mut points = centerline_graph(&set, spacing);
        summary.centerline_points = points.len();
        let fragments = points.fragments();
        summary.fragments = fragments.len();
        summary.bridges = self.bridge(&mut points, &fragments);

        let root = points.choose_root(root_component)?;
        let mut tree = points.level_tree(root);
        summary.unreachable_dropped = points.len() - tree.order.len();
        summary.spurs_pruned = tree.prune_spurs(self.config.min_spur_length_um);

        let skeleton = tree.into_skeleton(&points)?;
        skeleton.validate()?;
        summary.nodes = skeleton.len();

        info!(
            target: "autorecon-skeleton",
            "[BUILD] {} nodes from {} centerline points, {} bridges, {} unreachable, {} spurs pruned",
            summary.nodes,
            summary.centerline_points,
            summary.bridges,
            summary.unreachable_dropped,
            summary.spurs_pruned
        );
        Ok((skeleton, summary))
    }

    /// Join the closest point pair of every two fragments of different
    /// classes whose surface gap is within `bridge_distance_um`
    fn bridge(&self, graph: &mut PointGraph, fragments: &[Vec<usize>]) -> usize {
        let limit = self.config.bridge_distance_um;
        let boxes: Vec<FragmentBox> = fragments
            .iter()
            .map(|members| FragmentBox::of(graph, members))
            .collect();

        let mut bridges = Vec::new();
        for a in 0..fragments.len() {
            for b in (a + 1)..fragments.len() {
                if boxes[a].class == boxes[b].class {
                    continue;
                }
                if boxes[a].gap(&boxes[b]) - boxes[a].max_radius - boxes[b].max_radius > limit {
                    continue;
                }
                let mut best: Option<(f64, usize, usize)> = None;
                for &i in &fragments[a] {
                    for &j in &fragments[b] {
                        let d = physical_distance(
                            &graph.points[i].position,
                            &graph.points[j].position,
                        );
                        if best.map_or(true, |(bd, _, _)| d < bd) {
                            best = Some((d, i, j));
                        }
                    }
                }
                if let Some((d, i, j)) = best {
                    let gap = (d - graph.points[i].radius - graph.points[j].radius).max(0.0);
                    if gap <= limit {
                        bridges.push((i, j, d));
                    }
                }
            }
        }

        for &(i, j, d) in &bridges {
            graph.connect(i, j, d);
        }
        bridges.len()
    }
}

/// Thin every class and connect 26-adjacent points of the same component.
/// Points are ordered by class, then raster order.
fn centerline_graph(set: &ComponentSet, spacing: VoxelSpacing) -> PointGraph {
    let (nz, ny, nx) = set.map.dim();
    let shape = [nz, ny, nx];
    let mut centerlines = skeletonize(set);
    centerlines.sort_by_key(|(class, _)| *class);

    let mut voxels: Vec<VoxelIndex> = Vec::new();
    let mut classes = Vec::new();
    for (class, points) in centerlines {
        classes.extend(std::iter::repeat(class).take(points.len()));
        voxels.extend(points);
    }
    let point_radii = radii(&set.map, spacing, &voxels);

    let mut graph = PointGraph::default();
    let mut index: AHashMap<VoxelIndex, usize> = AHashMap::with_capacity(voxels.len());
    for ((&voxel, &class), &radius) in voxels.iter().zip(&classes).zip(&point_radii) {
        let slot = graph.push(CenterlinePoint {
            class,
            component: set.map[voxel],
            position: spacing.to_physical(voxel),
            radius,
        });
        index.insert(voxel, slot);
    }

    // forward half of the 26-neighborhood visits every pair once
    for (i, &voxel) in voxels.iter().enumerate() {
        for &offset in &OFFSETS_26[13..] {
            let Some(neighbor) = shifted(shape, voxel, offset) else {
                continue;
            };
            if let Some(&j) = index.get(&neighbor) {
                if graph.points[i].component == graph.points[j].component {
                    graph.connect(i, j, spacing.offset_length(offset));
                }
            }
        }
    }
    graph
}
