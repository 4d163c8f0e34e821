// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use autorecon_config::GraphConfig;
use autorecon_structures::{LabelVolume, NeuriteType, SkeletonGraph, VoxelClass, VoxelSpacing};
use ndarray::Array3;

pub const SHAPE: (usize, usize, usize) = (11, 11, 40);
pub const SOMA_CENTER: [usize; 3] = [5, 5, 6];
pub const SOMA_RADIUS: f64 = 4.0;

/// Thresholds sized for the small synthetic volumes below
pub fn graph_config() -> GraphConfig {
    GraphConfig {
        min_foreground_confidence: 0.5,
        min_component_voxels: 5,
        min_soma_voxels: 50,
        bridge_distance_um: 5.0,
        min_spur_length_um: 2.0,
    }
}

/// A soma ball with a straight 3x3 axon tube leaving it along +x
pub fn soma_and_tube_labels() -> Array3<VoxelClass> {
    let mut labels = Array3::from_elem(SHAPE, VoxelClass::Background);
    for ((z, y, x), label) in labels.indexed_iter_mut() {
        let d2 = [z, y, x]
            .iter()
            .zip(SOMA_CENTER)
            .map(|(&a, c)| (a as f64 - c as f64).powi(2))
            .sum::<f64>();
        if d2 <= SOMA_RADIUS * SOMA_RADIUS {
            *label = VoxelClass::Soma;
        } else if (4..7).contains(&z) && (4..7).contains(&y) && (11..38).contains(&x) {
            *label = VoxelClass::Axon;
        }
    }
    labels
}

pub fn soma_and_tube() -> LabelVolume {
    LabelVolume::from_labels(soma_and_tube_labels(), VoxelSpacing::isotropic(1.0).unwrap()).unwrap()
}

/// Same tube with one cross-section mislabeled as dendrite
pub fn tube_with_dendrite_slab(x: usize) -> LabelVolume {
    let mut labels = soma_and_tube_labels();
    for z in 4..7 {
        for y in 4..7 {
            labels[[z, y, x]] = VoxelClass::Dendrite;
        }
    }
    LabelVolume::from_labels(labels, VoxelSpacing::isotropic(1.0).unwrap()).unwrap()
}

pub fn count_kind(graph: &SkeletonGraph, kind: NeuriteType) -> usize {
    graph.nodes().filter(|n| n.kind == kind).count()
}
