// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Merging tile predictions into one label volume.

use crate::tiling::Tile;
use autorecon_config::StitchPolicy;
use autorecon_structures::{LabelVolume, ReconError, ReconResult, VoxelClass, VoxelSpacing};
use ndarray::{s, Array3, Array4, ArrayView4, Axis, Zip};

/// Accumulates per-class probabilities over the whole volume. Tiles may be
/// added in any order; the label volume only exists once [`Stitcher::finish`]
/// runs.
pub struct Stitcher {
    policy: StitchPolicy,
    volume_shape: [usize; 3],
    accumulated: Array4<f32>,
    counts: Array3<u32>,
}

impl Stitcher {
    pub fn new(policy: StitchPolicy, volume_shape: [usize; 3]) -> Self {
        let [z, y, x] = volume_shape;
        Self {
            policy,
            volume_shape,
            accumulated: Array4::zeros((VoxelClass::COUNT, z, y, x)),
            counts: Array3::zeros((z, y, x)),
        }
    }

    pub fn policy(&self) -> StitchPolicy {
        self.policy
    }

    /// Check a classifier output before it is merged
    pub fn check_prediction(tile: &Tile, probabilities: ArrayView4<'_, f32>) -> ReconResult<()> {
        let expected = (VoxelClass::COUNT, tile.shape[0], tile.shape[1], tile.shape[2]);
        if probabilities.dim() != expected {
            return Err(ReconError::MalformedInput(format!(
                "classifier returned shape {:?} for tile {}, expected {:?}",
                probabilities.dim(),
                tile.index,
                expected
            )));
        }
        if let Some(bad) = probabilities
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0 + 1e-4)
        {
            return Err(ReconError::MalformedInput(format!(
                "classifier returned probability {} for tile {}",
                bad, tile.index
            )));
        }
        Ok(())
    }

    /// Merge one tile's probabilities. The caller has already checked them.
    pub fn add(&mut self, tile: &Tile, probabilities: ArrayView4<'_, f32>) {
        let (start, end) = match self.policy {
            StitchPolicy::CoreCrop => (tile.core_start, tile.core_end),
            StitchPolicy::Average | StitchPolicy::Maximum => tile.covered(self.volume_shape),
        };
        if (0..3).any(|axis| start[axis] >= end[axis]) {
            return;
        }
        let local_start = tile.to_local(start);
        let local_end = tile.to_local(end);

        let source = probabilities.slice(s![
            ..,
            local_start[0]..local_end[0],
            local_start[1]..local_end[1],
            local_start[2]..local_end[2]
        ]);
        let mut target = self.accumulated.slice_mut(s![
            ..,
            start[0]..end[0],
            start[1]..end[1],
            start[2]..end[2]
        ]);
        let mut counts = self
            .counts
            .slice_mut(s![start[0]..end[0], start[1]..end[1], start[2]..end[2]]);

        match self.policy {
            StitchPolicy::CoreCrop => target.assign(&source),
            StitchPolicy::Average => target += &source,
            StitchPolicy::Maximum => {
                Zip::from(&mut target)
                    .and(&source)
                    .for_each(|acc, &p| *acc = acc.max(p));
            }
        }
        counts.mapv_inplace(|c| c + 1);
    }

    /// Arg-max every voxel (ties go to the lowest class index)
    pub fn finish(self, spacing: VoxelSpacing) -> ReconResult<LabelVolume> {
        if let Some(((z, y, x), _)) = self.counts.indexed_iter().find(|(_, c)| **c == 0) {
            return Err(ReconError::Internal(format!(
                "voxel [{}, {}, {}] was not covered by any tile",
                z, y, x
            )));
        }

        let [z, y, x] = self.volume_shape;
        let mut labels = Array3::from_elem((z, y, x), VoxelClass::Background);
        let mut confidence = Array3::<f32>::zeros((z, y, x));
        let average = self.policy == StitchPolicy::Average;

        Zip::from(&mut labels)
            .and(&mut confidence)
            .and(self.accumulated.lanes(Axis(0)))
            .and(&self.counts)
            .par_for_each(|label, conf, lane, &count| {
                let mut best = 0usize;
                for channel in 1..lane.len() {
                    if lane[channel] > lane[best] {
                        best = channel;
                    }
                }
                let mut value = lane[best];
                if average {
                    value /= count as f32;
                }
                *label = VoxelClass::from_channel(best).unwrap_or_default();
                *conf = value.clamp(0.0, 1.0);
            });

        LabelVolume::new(labels, confidence, spacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiling::TileGrid;

    fn constant_prediction(tile: &Tile, channel: usize, value: f32) -> Array4<f32> {
        let mut probs = Array4::from_elem((4, tile.shape[0], tile.shape[1], tile.shape[2]), (1.0 - value) / 3.0);
        probs.index_axis_mut(Axis(0), channel).fill(value);
        probs
    }

    #[test]
    fn test_ties_go_to_lowest_class() {
        let grid = TileGrid::plan([1, 1, 2], [1, 1, 2], [0, 0, 0]).unwrap();
        let tile = grid.tiles[0];
        let probs = Array4::from_elem((4, 1, 1, 2), 0.25f32);
        let mut stitcher = Stitcher::new(StitchPolicy::CoreCrop, [1, 1, 2]);
        stitcher.add(&tile, probs.view());
        let labels = stitcher.finish(VoxelSpacing::isotropic(1.0).unwrap()).unwrap();
        assert_eq!(labels.count(VoxelClass::Background), 2);
    }

    #[test]
    fn test_average_divides_by_coverage() {
        let shape = [1, 1, 4];
        let grid = TileGrid::plan(shape, [1, 1, 4], [0, 0, 1]).unwrap();
        let mut stitcher = Stitcher::new(StitchPolicy::Average, shape);
        for tile in &grid.tiles {
            let probs = constant_prediction(tile, VoxelClass::Axon.channel(), 0.7);
            Stitcher::check_prediction(tile, probs.view()).unwrap();
            stitcher.add(tile, probs.view());
        }
        let labels = stitcher.finish(VoxelSpacing::isotropic(1.0).unwrap()).unwrap();
        assert_eq!(labels.count(VoxelClass::Axon), 4);
        assert!(labels.confidence().iter().all(|&c| (c - 0.7).abs() < 1e-5));
    }

    #[test]
    fn test_maximum_takes_strongest_tile() {
        let shape = [1, 1, 4];
        let grid = TileGrid::plan(shape, [1, 1, 4], [0, 0, 1]).unwrap();
        let mut stitcher = Stitcher::new(StitchPolicy::Maximum, shape);
        for (i, tile) in grid.tiles.iter().enumerate() {
            let value = if i == 0 { 0.9 } else { 0.6 };
            let probs = constant_prediction(tile, VoxelClass::Soma.channel(), value);
            stitcher.add(tile, probs.view());
        }
        let labels = stitcher.finish(VoxelSpacing::isotropic(1.0).unwrap()).unwrap();
        // the first tile covers x in 0..3
        assert_eq!(labels.confidence_at([0, 0, 0]), Some(0.9));
        assert_eq!(labels.confidence_at([0, 0, 2]), Some(0.9));
        assert_eq!(labels.confidence_at([0, 0, 3]), Some(0.6));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let grid = TileGrid::plan([2, 2, 2], [2, 2, 2], [0, 0, 0]).unwrap();
        let probs = Array4::<f32>::zeros((3, 2, 2, 2));
        let result = Stitcher::check_prediction(&grid.tiles[0], probs.view());
        assert!(matches!(result, Err(ReconError::MalformedInput(_))));

        let probs = Array4::from_elem((4, 2, 2, 2), f32::NAN);
        assert!(Stitcher::check_prediction(&grid.tiles[0], probs.view()).is_err());
    }

    #[test]
    fn test_uncovered_voxel_is_internal_error() {
        let stitcher = Stitcher::new(StitchPolicy::CoreCrop, [1, 1, 1]);
        let result = stitcher.finish(VoxelSpacing::isotropic(1.0).unwrap());
        assert!(matches!(result, Err(ReconError::Internal(_))));
    }
}
