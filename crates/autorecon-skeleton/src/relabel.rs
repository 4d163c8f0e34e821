// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Axon/dendrite correction on a built skeleton.
//!
//! The tree is cut into segments (single-child runs below the soma core or a
//! branch point) and every segment gets one type. Segments are decided top
//! down so a child segment can lean on its parent's decision.

use ahash::{AHashMap, AHashSet};
use autorecon_config::RelabelConfig;
use autorecon_structures::{
    physical_distance, NeuriteType, NodeId, ReconError, ReconResult, SkeletonGraph,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelabelSummary {
    pub segments: usize,
    pub nodes_changed: usize,
    pub decided_by_vote: usize,
    pub decided_by_evidence: usize,
    pub stray_soma_reassigned: usize,
}

/// One single-type run of the tree, in root-to-tip order
#[derive(Debug)]
struct Segment {
    nodes: Vec<NodeId>,
    /// Segment holding the attachment node, `None` when attached to the core
    parent_segment: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Relabeler {
    config: RelabelConfig,
}

impl Relabeler {
    pub fn new(config: RelabelConfig) -> Self {
        Self { config }
    }

    /// Re-type every non-core node in place. Running it twice changes nothing
    /// the second time.
    pub fn relabel(&self, graph: &mut SkeletonGraph) -> ReconResult<RelabelSummary> {
        graph.validate()?;
        let geodesic = graph.geodesic_distances()?;
        let order = graph.breadth_first()?;
        let core = soma_core(graph, &order);
        let segments = decompose(graph, &order, &core)?;

        let mut summary = RelabelSummary {
            segments: segments.len(),
            ..RelabelSummary::default()
        };
        let mut decided: Vec<NeuriteType> = Vec::with_capacity(segments.len());
        for segment in &segments {
            let parent_type = segment.parent_segment.map(|s| decided[s]);
            let (kind, by_vote) = self.decide(graph, &geodesic, segment, parent_type)?;
            if by_vote {
                summary.decided_by_vote += 1;
            } else {
                summary.decided_by_evidence += 1;
            }
            decided.push(kind);
        }

        for (segment, &kind) in segments.iter().zip(&decided) {
            for &id in &segment.nodes {
                let previous = graph.set_kind(id, kind)?;
                if previous != kind {
                    summary.nodes_changed += 1;
                    if previous == NeuriteType::Soma {
                        summary.stray_soma_reassigned += 1;
                    }
                }
            }
        }

        graph.validate()?;
        info!(
            target: "autorecon-skeleton",
            "[RELABEL] {} segments ({} by vote, {} by evidence), {} nodes changed, {} stray soma nodes",
            summary.segments,
            summary.decided_by_vote,
            summary.decided_by_evidence,
            summary.nodes_changed,
            summary.stray_soma_reassigned
        );
        Ok(summary)
    }

    /// Type for one segment and whether the raw vote alone settled it
    fn decide(
        &self,
        graph: &SkeletonGraph,
        geodesic: &AHashMap<NodeId, f64>,
        segment: &Segment,
        parent_type: Option<NeuriteType>,
    ) -> ReconResult<(NeuriteType, bool)> {
        let mut axon = 0usize;
        let mut dendrite = 0usize;
        let mut radii = Vec::with_capacity(segment.nodes.len());
        for &id in &segment.nodes {
            let node = graph
                .node(id)
                .ok_or_else(|| ReconError::Internal(format!("segment node {} vanished", id)))?;
            match node.kind {
                NeuriteType::Axon => axon += 1,
                NeuriteType::Dendrite => dendrite += 1,
                NeuriteType::Soma => {}
            }
            radii.push(node.radius);
        }

        let votes = axon + dendrite;
        if votes > 0 && axon != dendrite {
            let (majority, count) = if axon > dendrite {
                (NeuriteType::Axon, axon)
            } else {
                (NeuriteType::Dendrite, dendrite)
            };
            if count as f64 / votes as f64 >= self.config.majority_threshold {
                return Ok((majority, true));
            }
        }

        // positive leans axon, negative leans dendrite
        let mut score = 0.0;
        if votes > 0 {
            score += 2.0 * (axon as f64 - dendrite as f64) / votes as f64;
        }

        let mean = radii.iter().sum::<f64>() / radii.len() as f64;
        score += if mean <= self.config.axon_max_radius_um { 1.0 } else { -1.0 };
        let cv = if mean > 0.0 {
            let variance = radii.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / radii.len() as f64;
            variance.sqrt() / mean
        } else {
            0.0
        };
        score += if cv <= self.config.axon_max_radius_cv { 0.5 } else { -0.5 };

        if let Some(straightness) = straightness(graph, geodesic, segment) {
            score += if straightness >= self.config.straightness_threshold {
                1.0
            } else {
                -1.0
            };
        }

        score += match parent_type {
            Some(NeuriteType::Axon) => 1.0,
            Some(NeuriteType::Dendrite) => -1.0,
            _ => 0.0,
        };

        let kind = if score > 0.0 {
            NeuriteType::Axon
        } else if score < 0.0 {
            NeuriteType::Dendrite
        } else {
            match parent_type {
                Some(kind) if kind.is_neurite() => kind,
                _ => NeuriteType::Dendrite,
            }
        };
        debug!(
            target: "autorecon-skeleton",
            "[RELABEL] segment at node {:?}: {} axon / {} dendrite votes, score {:.2} -> {:?}",
            segment.nodes.first(),
            axon,
            dendrite,
            score,
            kind
        );
        Ok((kind, false))
    }
}

/// Root plus every soma node joined to it through soma nodes only
fn soma_core(graph: &SkeletonGraph, order: &[NodeId]) -> AHashSet<NodeId> {
    let mut core = AHashSet::new();
    for &id in order {
        let is_soma = graph.node(id).map(|n| n.kind) == Some(NeuriteType::Soma);
        if !is_soma {
            continue;
        }
        match graph.parent(id) {
            None => {
                core.insert(id);
            }
            Some(parent) if core.contains(&parent) => {
                core.insert(id);
            }
            Some(_) => {}
        }
    }
    core
}

/// Segments in breadth-first order of their first node, so a parent segment
/// always precedes its children
fn decompose(
    graph: &SkeletonGraph,
    order: &[NodeId],
    core: &AHashSet<NodeId>,
) -> ReconResult<Vec<Segment>> {
    let mut owner: AHashMap<NodeId, usize> = AHashMap::new();
    let mut segments = Vec::new();
    for &id in order {
        if core.contains(&id) || owner.contains_key(&id) {
            continue;
        }
        let parent = graph.parent(id).ok_or_else(|| {
            ReconError::Internal(format!("non-core node {} has no parent", id))
        })?;
        let starts_here = core.contains(&parent) || graph.degree(parent) > 2;
        if !starts_here {
            return Err(ReconError::Internal(format!(
                "node {} is not covered by its parent's segment",
                id
            )));
        }
        let parent_segment = owner.get(&parent).copied();

        let index = segments.len();
        let mut nodes = vec![id];
        owner.insert(id, index);
        let mut current = id;
        while graph.child_count(current) == 1 {
            let Some(next) = graph.children(current).next() else {
                break;
            };
            owner.insert(next, index);
            nodes.push(next);
            current = next;
        }
        segments.push(Segment {
            nodes,
            parent_segment,
        });
    }
    Ok(segments)
}

/// Chord over path length from the attachment point to the segment end.
/// Segments shorter than three nodes carry no shape information.
fn straightness(
    graph: &SkeletonGraph,
    geodesic: &AHashMap<NodeId, f64>,
    segment: &Segment,
) -> Option<f64> {
    if segment.nodes.len() < 3 {
        return None;
    }
    let first = *segment.nodes.first()?;
    let last = *segment.nodes.last()?;
    let attach = graph.parent(first)?;
    let path = geodesic.get(&last)? - geodesic.get(&attach)?;
    if path <= 0.0 {
        return None;
    }
    let chord = physical_distance(&graph.node(attach)?.position, &graph.node(last)?.position);
    Some(chord / path)
}
