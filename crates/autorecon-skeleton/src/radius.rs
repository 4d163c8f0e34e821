// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Local radius of centerline points.

use crate::components::shifted;
use autorecon_structures::{VoxelIndex, VoxelSpacing};
use ndarray::Array3;
use rayon::prelude::*;

/// Physical distance from `point` to the nearest voxel outside its component,
/// minus half the smallest voxel edge, floored at zero. Voxels beyond the
/// volume edge count as outside.
pub fn radius_at(map: &Array3<u32>, spacing: VoxelSpacing, point: VoxelIndex) -> f64 {
    let (nz, ny, nx) = map.dim();
    let shape = [nz, ny, nx];
    let edges = spacing.as_zyx();
    let component = map[point];

    let mut best = f64::INFINITY;
    for axis in 0..3 {
        let low = (point[axis] + 1) as f64 * edges[axis];
        let high = (shape[axis] - point[axis]) as f64 * edges[axis];
        best = best.min(low).min(high);
    }

    // Chebyshev shells; every voxel in shell r is at least r * min_edge away
    let min_edge = spacing.min_edge();
    let mut r: i64 = 1;
    while (r as f64) * min_edge < best {
        for dz in -r..=r {
            for dy in -r..=r {
                for dx in -r..=r {
                    if dz.abs().max(dy.abs()).max(dx.abs()) != r {
                        continue;
                    }
                    let Some(q) = shifted(shape, point, [dz, dy, dx]) else {
                        continue;
                    };
                    if map[q] != component {
                        best = best.min(spacing.offset_length([dz, dy, dx]));
                    }
                }
            }
        }
        r += 1;
    }

    (best - min_edge / 2.0).max(0.0)
}

/// [`radius_at`] for many points, in parallel
pub fn radii(map: &Array3<u32>, spacing: VoxelSpacing, points: &[VoxelIndex]) -> Vec<f64> {
    points
        .par_iter()
        .map(|&p| radius_at(map, spacing, p))
        .collect()
}
