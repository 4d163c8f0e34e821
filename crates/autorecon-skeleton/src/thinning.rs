// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sequential topology-preserving thinning of a binary mask.
//!
//! A foreground point is removed only when it is *simple*: its foreground
//! 26-neighbors form exactly one 26-connected piece, and the background in its
//! 18-neighborhood forms exactly one 6-connected piece touching one of its
//! faces. Removing simple points one at a time never splits a component and
//! never opens or closes a loop. Curve end points (exactly one foreground
//! neighbor) and isolated points are kept so thin branches survive.

use crate::components::{shifted, ComponentSet};
use autorecon_structures::{VoxelClass, VoxelIndex};
use ndarray::Array3;
use rayon::prelude::*;

/// Sub-iteration order: +y, -y, +z, -z, +x, -x
const DIRECTIONS: [[i64; 3]; 6] = [
    [0, 1, 0],
    [0, -1, 0],
    [1, 0, 0],
    [-1, 0, 0],
    [0, 0, 1],
    [0, 0, -1],
];

const CENTER: usize = 13;

fn cube_offset(index: usize) -> [i64; 3] {
    let i = index as i64;
    [i / 9 - 1, (i / 3) % 3 - 1, i % 3 - 1]
}

/// 3x3x3 neighborhood; outside the volume is background
fn neighborhood(mask: &Array3<bool>, shape: [usize; 3], point: VoxelIndex) -> [bool; 27] {
    let mut cube = [false; 27];
    for (i, cell) in cube.iter_mut().enumerate() {
        if let Some(q) = shifted(shape, point, cube_offset(i)) {
            *cell = mask[q];
        }
    }
    cube
}

fn foreground_neighbors(cube: &[bool; 27]) -> usize {
    cube.iter()
        .enumerate()
        .filter(|&(i, &v)| v && i != CENTER)
        .count()
}

/// Connected pieces among `cells`, where two cells touch when
/// `adjacent(a, b)`. Only pieces containing a `seed` cell are counted.
fn count_pieces(
    cells: &[bool; 27],
    seeds: impl Fn(usize) -> bool,
    adjacent: impl Fn([i64; 3], [i64; 3]) -> bool,
) -> usize {
    let mut seen = [false; 27];
    let mut pieces = 0;
    let mut stack = Vec::with_capacity(27);
    for start in 0..27 {
        if !cells[start] || seen[start] || !seeds(start) {
            continue;
        }
        pieces += 1;
        seen[start] = true;
        stack.push(start);
        while let Some(a) = stack.pop() {
            let oa = cube_offset(a);
            for b in 0..27 {
                if cells[b] && !seen[b] && adjacent(oa, cube_offset(b)) {
                    seen[b] = true;
                    stack.push(b);
                }
            }
        }
    }
    pieces
}

fn manhattan(o: [i64; 3]) -> i64 {
    o[0].abs() + o[1].abs() + o[2].abs()
}

/// Simple-point test on a 3x3x3 neighborhood (center value is ignored)
pub fn is_simple(cube: &[bool; 27]) -> bool {
    let mut foreground = *cube;
    foreground[CENTER] = false;
    let fg_pieces = count_pieces(
        &foreground,
        |_| true,
        |a, b| a != b && (0..3).all(|k| (a[k] - b[k]).abs() <= 1),
    );
    if fg_pieces != 1 {
        return false;
    }

    let mut background = [false; 27];
    for (i, cell) in background.iter_mut().enumerate() {
        let d = manhattan(cube_offset(i));
        *cell = (d == 1 || d == 2) && !cube[i];
    }
    let bg_pieces = count_pieces(
        &background,
        |i| manhattan(cube_offset(i)) == 1,
        |a, b| (0..3).map(|k| (a[k] - b[k]).abs()).sum::<i64>() == 1,
    );
    bg_pieces == 1
}

fn is_border(mask: &Array3<bool>, shape: [usize; 3], point: VoxelIndex, direction: [i64; 3]) -> bool {
    match shifted(shape, point, direction) {
        Some(q) => !mask[q],
        None => true,
    }
}

/// Thin `mask` in place until stable. Returns the number of removed points.
pub fn thin(mask: &mut Array3<bool>) -> usize {
    let (z, y, x) = mask.dim();
    let shape = [z, y, x];
    let mut points: Vec<VoxelIndex> = mask
        .indexed_iter()
        .filter(|(_, &v)| v)
        .map(|((a, b, c), _)| [a, b, c])
        .collect();

    let mut removed_total = 0;
    loop {
        let mut removed = 0;
        for direction in DIRECTIONS {
            let candidates: Vec<VoxelIndex> = points
                .iter()
                .copied()
                .filter(|&p| mask[p] && is_border(mask, shape, p, direction))
                .collect();
            for p in candidates {
                if !is_border(mask, shape, p, direction) {
                    continue;
                }
                let cube = neighborhood(mask, shape, p);
                if foreground_neighbors(&cube) <= 1 {
                    continue;
                }
                if is_simple(&cube) {
                    mask[p] = false;
                    removed += 1;
                }
            }
        }
        if removed == 0 {
            break;
        }
        removed_total += removed;
        points.retain(|&p| mask[p]);
    }
    removed_total
}

/// Centerline points of every surviving component, per class in raster order.
/// Classes are thinned in parallel.
pub fn skeletonize(set: &ComponentSet) -> Vec<(VoxelClass, Vec<VoxelIndex>)> {
    VoxelClass::FOREGROUND
        .par_iter()
        .map(|&class| {
            let mut mask = Array3::from_elem(set.map.raw_dim(), false);
            for component in set.of_class(class) {
                for &voxel in &component.voxels {
                    mask[voxel] = true;
                }
            }
            thin(&mut mask);
            let points = mask
                .indexed_iter()
                .filter(|(_, &v)| v)
                .map(|((a, b, c), _)| [a, b, c])
                .collect();
            (class, points)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::label_mask;

    fn cube_index(offset: [i64; 3]) -> usize {
        ((offset[0] + 1) * 9 + (offset[1] + 1) * 3 + (offset[2] + 1)) as usize
    }

    fn cube_from(offsets: &[[i64; 3]]) -> [bool; 27] {
        let mut cube = [false; 27];
        for &o in offsets {
            cube[cube_index(o)] = true;
        }
        cube
    }

    #[test]
    fn test_cube_index_round_trip() {
        for i in 0..27 {
            assert_eq!(cube_index(cube_offset(i)), i);
        }
        assert_eq!(cube_offset(CENTER), [0, 0, 0]);
    }

    #[test]
    fn test_simple_point_cases() {
        // tip of a line
        assert!(is_simple(&cube_from(&[[0, 0, 1]])));
        // middle of a line joins two pieces
        assert!(!is_simple(&cube_from(&[[0, 0, 1], [0, 0, -1]])));
        // interior point would open a cavity
        assert!(!is_simple(&[true; 27]));
        // face of a slab
        let slab: Vec<[i64; 3]> = (0..27)
            .map(cube_offset)
            .filter(|o| o[0] <= 0)
            .collect();
        assert!(is_simple(&cube_from(&slab)));
    }

    #[test]
    fn test_thick_bar_thins_to_connected_line() {
        let mut mask = Array3::from_elem((5, 5, 20), false);
        for z in 1..4 {
            for y in 1..4 {
                for x in 2..18 {
                    mask[[z, y, x]] = true;
                }
            }
        }
        let before = mask.iter().filter(|&&v| v).count();
        let removed = thin(&mut mask);
        let after = mask.iter().filter(|&&v| v).count();

        assert_eq!(before - removed, after);
        assert!(after < before / 4);
        assert_eq!(label_mask(&mask).len(), 1);
        // the line still spans most of the bar
        let xs: Vec<usize> = mask
            .indexed_iter()
            .filter(|(_, &v)| v)
            .map(|((_, _, x), _)| x)
            .collect();
        let span = xs.iter().max().unwrap() - xs.iter().min().unwrap();
        assert!(span >= 8, "span {}", span);
    }

    #[test]
    fn test_isolated_point_survives() {
        let mut mask = Array3::from_elem((3, 3, 3), false);
        mask[[1, 1, 1]] = true;
        assert_eq!(thin(&mut mask), 0);
        assert!(mask[[1, 1, 1]]);
    }

    #[test]
    fn test_ring_keeps_its_hole() {
        // a square ring in one plane must stay a loop
        let mut mask = Array3::from_elem((3, 9, 9), false);
        for y in 1..8 {
            for x in 1..8 {
                let edge = y <= 2 || y >= 6 || x <= 2 || x >= 6;
                if edge {
                    mask[[1, y, x]] = true;
                }
            }
        }
        thin(&mut mask);
        assert_eq!(label_mask(&mask).len(), 1);
        // the hole is still background
        assert!(!mask[[1, 4, 4]]);
        let remaining = mask.iter().filter(|&&v| v).count();
        assert!(remaining >= 8);
    }
}
