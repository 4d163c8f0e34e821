// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Tile layout over a volume.

The volume is cut into non-overlapping cores. Every tile is a fixed-shape box
placed at its core's start minus the margin, so it may reach outside the
volume; those voxels are read as zero.
*/

use autorecon_structures::{ReconError, ReconResult};
use ndarray::{s, Array3, ArrayView3};

/// One tile of a [`TileGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub index: usize,
    /// Inclusive start of the core, volume coordinates
    pub core_start: [usize; 3],
    /// Exclusive end of the core, clipped to the volume
    pub core_end: [usize; 3],
    /// Position of the tile's first voxel, may be negative
    pub origin: [i64; 3],
    pub shape: [usize; 3],
}

impl Tile {
    /// Part of the tile that lies inside a volume of `volume_shape`, as
    /// `(start, end)` in volume coordinates
    pub fn covered(&self, volume_shape: [usize; 3]) -> ([usize; 3], [usize; 3]) {
        let mut start = [0usize; 3];
        let mut end = [0usize; 3];
        for axis in 0..3 {
            let lo = self.origin[axis].max(0) as usize;
            let hi = (self.origin[axis] + self.shape[axis] as i64).max(0) as usize;
            start[axis] = lo.min(volume_shape[axis]);
            end[axis] = hi.min(volume_shape[axis]);
        }
        (start, end)
    }

    /// Convert a volume coordinate inside the tile to a tile-local one
    pub fn to_local(&self, global: [usize; 3]) -> [usize; 3] {
        [0, 1, 2].map(|axis| (global[axis] as i64 - self.origin[axis]) as usize)
    }

    /// Copy the tile out of `data`, zero padding wherever it leaves the volume
    pub fn extract(&self, data: ArrayView3<'_, f32>) -> Array3<f32> {
        let (z, y, x) = data.dim();
        let mut tile = Array3::zeros((self.shape[0], self.shape[1], self.shape[2]));
        let (start, end) = self.covered([z, y, x]);
        if (0..3).any(|axis| start[axis] >= end[axis]) {
            return tile;
        }
        let local_start = self.to_local(start);
        let local_end = self.to_local(end);
        tile.slice_mut(s![
            local_start[0]..local_end[0],
            local_start[1]..local_end[1],
            local_start[2]..local_end[2]
        ])
        .assign(&data.slice(s![start[0]..end[0], start[1]..end[1], start[2]..end[2]]));
        tile
    }
}

/// Every tile needed to cover a volume
#[derive(Debug, Clone)]
pub struct TileGrid {
    pub volume_shape: [usize; 3],
    pub tile_shape: [usize; 3],
    pub margin: [usize; 3],
    pub core_shape: [usize; 3],
    pub tiles: Vec<Tile>,
}

impl TileGrid {
    /// Lay out tiles of `tile_shape` with `margin` on each side of the core
    pub fn plan(volume_shape: [usize; 3], tile_shape: [usize; 3], margin: [usize; 3]) -> ReconResult<Self> {
        if volume_shape.iter().any(|&n| n == 0) {
            return Err(ReconError::MalformedInput(
                "cannot tile an empty volume".to_string(),
            ));
        }
        let mut core_shape = [0usize; 3];
        for axis in 0..3 {
            if tile_shape[axis] <= 2 * margin[axis] {
                return Err(ReconError::MalformedInput(format!(
                    "tile extent {} on axis {} must exceed twice the margin {}",
                    tile_shape[axis], axis, margin[axis]
                )));
            }
            core_shape[axis] = tile_shape[axis] - 2 * margin[axis];
        }

        let starts: Vec<Vec<usize>> = (0..3)
            .map(|axis| (0..volume_shape[axis]).step_by(core_shape[axis]).collect())
            .collect();

        let mut tiles = Vec::with_capacity(starts[0].len() * starts[1].len() * starts[2].len());
        for &z in &starts[0] {
            for &y in &starts[1] {
                for &x in &starts[2] {
                    let core_start = [z, y, x];
                    let core_end = [0, 1, 2]
                        .map(|axis| (core_start[axis] + core_shape[axis]).min(volume_shape[axis]));
                    let origin = [0, 1, 2]
                        .map(|axis| core_start[axis] as i64 - margin[axis] as i64);
                    tiles.push(Tile {
                        index: tiles.len(),
                        core_start,
                        core_end,
                        origin,
                        shape: tile_shape,
                    });
                }
            }
        }

        Ok(Self {
            volume_shape,
            tile_shape,
            margin,
            core_shape,
            tiles,
        })
    }

    /// Same volume with the core halved on every axis and the margin kept
    pub fn halved(&self) -> ReconResult<Self> {
        let tile_shape = [0, 1, 2].map(|axis| {
            (self.core_shape[axis] / 2).max(1) + 2 * self.margin[axis]
        });
        Self::plan(self.volume_shape, tile_shape, self.margin)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cores_partition_volume() {
        let shape = [5, 9, 7];
        let grid = TileGrid::plan(shape, [4, 6, 6], [1, 1, 2]).unwrap();
        assert_eq!(grid.core_shape, [2, 4, 2]);

        let mut hits = Array3::<u32>::zeros((5, 9, 7));
        for tile in &grid.tiles {
            hits.slice_mut(s![
                tile.core_start[0]..tile.core_end[0],
                tile.core_start[1]..tile.core_end[1],
                tile.core_start[2]..tile.core_end[2]
            ])
            .mapv_inplace(|h| h + 1);
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_extract_zero_pads_outside() {
        let data = Array3::from_elem((3, 3, 3), 1.0f32);
        let grid = TileGrid::plan([3, 3, 3], [3, 3, 3], [1, 1, 1]).unwrap();
        let first = grid.tiles[0];
        assert_eq!(first.origin, [-1, -1, -1]);

        let tile = first.extract(data.view());
        assert_eq!(tile.dim(), (3, 3, 3));
        assert_eq!(tile[[0, 0, 0]], 0.0);
        assert_eq!(tile[[1, 1, 1]], 1.0);
        assert_eq!(tile[[2, 2, 2]], 1.0);
        assert_eq!(tile.sum(), 8.0);
    }

    #[test]
    fn test_margin_must_fit() {
        assert!(TileGrid::plan([4, 4, 4], [4, 4, 4], [2, 1, 1]).is_err());
    }

    #[test]
    fn test_halved_keeps_margin() {
        let grid = TileGrid::plan([16, 16, 16], [12, 12, 12], [2, 2, 2]).unwrap();
        let halved = grid.halved().unwrap();
        assert_eq!(halved.core_shape, [4, 4, 4]);
        assert_eq!(halved.margin, [2, 2, 2]);
        assert_eq!(halved.tile_shape, [8, 8, 8]);
        assert!(halved.len() > grid.len());
    }
}
