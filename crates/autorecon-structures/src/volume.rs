// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Intensity volumes and their physical voxel spacing.

use crate::error::{ReconError, ReconResult};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Voxel index in `[z, y, x]` order
pub type VoxelIndex = [usize; 3];

/// Physical position in micrometers, `[x, y, z]` order
pub type Position = [f64; 3];

/// Euclidean distance between two physical positions
pub fn physical_distance(a: &Position, b: &Position) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Physical size of one voxel along each axis, in micrometers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSpacing {
    pub z: f64,
    pub y: f64,
    pub x: f64,
}

impl VoxelSpacing {
    pub fn new(z: f64, y: f64, x: f64) -> ReconResult<Self> {
        let spacing = Self { z, y, x };
        spacing.validate()?;
        Ok(spacing)
    }

    pub fn isotropic(edge: f64) -> ReconResult<Self> {
        Self::new(edge, edge, edge)
    }

    /// Build from a `[z, y, x]` triple as found in manifests and configs
    pub fn from_zyx(values: [f64; 3]) -> ReconResult<Self> {
        Self::new(values[0], values[1], values[2])
    }

    pub fn validate(&self) -> ReconResult<()> {
        for (axis, value) in [("z", self.z), ("y", self.y), ("x", self.x)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReconError::MalformedInput(format!(
                    "voxel size along {} must be a positive number of micrometers, got {}",
                    axis, value
                )));
            }
        }
        Ok(())
    }

    pub fn as_zyx(&self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    /// Smallest voxel edge
    pub fn min_edge(&self) -> f64 {
        self.z.min(self.y).min(self.x)
    }

    /// Physical position of a voxel center
    pub fn to_physical(&self, index: VoxelIndex) -> Position {
        [
            index[2] as f64 * self.x,
            index[1] as f64 * self.y,
            index[0] as f64 * self.z,
        ]
    }

    /// Physical length of a signed voxel offset `[dz, dy, dx]`
    pub fn offset_length(&self, offset: [i64; 3]) -> f64 {
        let dz = offset[0] as f64 * self.z;
        let dy = offset[1] as f64 * self.y;
        let dx = offset[2] as f64 * self.x;
        (dz * dz + dy * dy + dx * dx).sqrt()
    }

    /// Physical distance between two voxel centers
    pub fn distance(&self, a: VoxelIndex, b: VoxelIndex) -> f64 {
        self.offset_length([
            a[0] as i64 - b[0] as i64,
            a[1] as i64 - b[1] as i64,
            a[2] as i64 - b[2] as i64,
        ])
    }
}

/// A normalized 3-D intensity stack.
///
/// The sample buffer sits behind an `Arc`: cloning a `Volume` is cheap and
/// every clone sees the same immutable data. Nothing hands out mutable access
/// once the volume is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    data: Arc<Array3<f32>>,
    spacing: VoxelSpacing,
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: VoxelSpacing) -> ReconResult<Self> {
        spacing.validate()?;
        if data.is_empty() {
            return Err(ReconError::MalformedInput(
                "volume has no voxels".to_string(),
            ));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ReconError::MalformedInput(
                "volume contains non-finite intensities".to_string(),
            ));
        }
        Ok(Self {
            data: Arc::new(data),
            spacing,
        })
    }

    /// Min-max scale raw intensities into [0, 1], optionally inverted.
    ///
    /// A constant stack carries no signal and normalizes to all zeros.
    pub fn normalized(raw: Array3<f32>, spacing: VoxelSpacing, invert: bool) -> ReconResult<Self> {
        let (min, max) = raw
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        let data = if range > 0.0 && range.is_finite() {
            raw.mapv(|v| {
                let scaled = (v - min) / range;
                if invert {
                    1.0 - scaled
                } else {
                    scaled
                }
            })
        } else {
            Array3::zeros(raw.raw_dim())
        };
        Self::new(data, spacing)
    }

    /// `[z, y, x]` extent
    pub fn shape(&self) -> [usize; 3] {
        let dim = self.data.dim();
        [dim.0, dim.1, dim.2]
    }

    pub fn spacing(&self) -> VoxelSpacing {
        self.spacing
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Shared handle to the sample buffer, for workers that outlive a borrow
    pub fn shared_data(&self) -> Arc<Array3<f32>> {
        Arc::clone(&self.data)
    }

    pub fn voxel_count(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_rejects_non_positive() {
        assert!(VoxelSpacing::new(1.0, 0.0, 1.0).is_err());
        assert!(VoxelSpacing::new(1.0, f64::NAN, 1.0).is_err());
        assert!(VoxelSpacing::new(2.0, 0.5, 0.5).is_ok());
    }

    #[test]
    fn test_spacing_physical_axis_order() {
        let spacing = VoxelSpacing::new(2.0, 0.5, 0.25).unwrap();
        assert_eq!(spacing.to_physical([1, 2, 4]), [1.0, 1.0, 2.0]);
        assert_eq!(spacing.min_edge(), 0.25);
        assert!((spacing.distance([0, 0, 0], [1, 0, 0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_and_invert() {
        let raw = Array3::from_shape_vec((1, 1, 3), vec![10.0, 20.0, 30.0]).unwrap();
        let spacing = VoxelSpacing::isotropic(1.0).unwrap();

        let plain = Volume::normalized(raw.clone(), spacing, false).unwrap();
        assert_eq!(plain.view().iter().copied().collect::<Vec<_>>(), vec![0.0, 0.5, 1.0]);

        let inverted = Volume::normalized(raw, spacing, true).unwrap();
        assert_eq!(inverted.view().iter().copied().collect::<Vec<_>>(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_constant_volume_normalizes_to_zero() {
        let raw = Array3::from_elem((2, 2, 2), 7.0f32);
        let volume = Volume::normalized(raw, VoxelSpacing::isotropic(1.0).unwrap(), false).unwrap();
        assert!(volume.view().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_clone_shares_buffer() {
        let volume = Volume::new(Array3::zeros((2, 3, 4)), VoxelSpacing::isotropic(1.0).unwrap()).unwrap();
        let other = volume.clone();
        assert!(Arc::ptr_eq(&volume.shared_data(), &other.shared_data()));
        assert_eq!(volume.shape(), [2, 3, 4]);
    }
}
