// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use autorecon_structures::{NeuriteType, SkeletonGraph};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Basic shape statistics of one reconstructed neuron
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphometrySummary {
    pub nodes: usize,
    /// Leaves other than the root
    pub tips: usize,
    /// Nodes with two or more children
    pub branch_points: usize,
    pub soma_cable_um: f64,
    pub axon_cable_um: f64,
    pub dendrite_cable_um: f64,
    pub total_cable_um: f64,
}

impl MorphometrySummary {
    /// Each edge is credited to the type of its child end
    pub fn of(graph: &SkeletonGraph) -> Self {
        let mut summary = MorphometrySummary {
            nodes: graph.len(),
            ..Self::default()
        };
        for node in graph.nodes() {
            let children = graph.child_count(node.id);
            let is_root = graph.parent(node.id).is_none();
            if children == 0 && !is_root {
                summary.tips += 1;
            }
            if children >= 2 {
                summary.branch_points += 1;
            }
            if let Some(length) = graph.edge_length(node.id) {
                match node.kind {
                    NeuriteType::Soma => summary.soma_cable_um += length,
                    NeuriteType::Axon => summary.axon_cable_um += length,
                    NeuriteType::Dendrite => summary.dendrite_cable_um += length,
                }
                summary.total_cable_um += length;
            }
        }
        summary
    }
}

impl Display for MorphometrySummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "nodes:          {}", self.nodes)?;
        writeln!(f, "tips:           {}", self.tips)?;
        writeln!(f, "branch points:  {}", self.branch_points)?;
        writeln!(f, "soma cable:     {:.2} um", self.soma_cable_um)?;
        writeln!(f, "axon cable:     {:.2} um", self.axon_cable_um)?;
        writeln!(f, "dendrite cable: {:.2} um", self.dendrite_cable_um)?;
        write!(f, "total cable:    {:.2} um", self.total_cable_um)
    }
}
