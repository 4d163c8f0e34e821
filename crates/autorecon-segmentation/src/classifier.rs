// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Classifier contract and the built-in intensity band classifier.

use autorecon_config::IntensityBandConfig;
use autorecon_structures::VoxelClass;
use ndarray::{Array4, ArrayView3, Axis, Zip};

/// Errors a classifier may report for a tile
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier failed: {0}")]
    Failed(String),

    /// Not enough memory or accelerator capacity for this tile size
    #[error("Classifier ran out of resources: {0}")]
    ResourceExhausted(String),
}

/// A voxel-wise four-class model.
///
/// `predict` receives one tile in `[z, y, x]` order and returns class
/// probabilities shaped `(4, z, y, x)` in channel order background, soma,
/// axon, dendrite. Implementations are shared between tile workers.
pub trait Classifier: Send + Sync {
    fn predict(&self, tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError>;

    /// Receptive-field radius per axis, `[z, y, x]`. Tile margins must be at
    /// least this large for stitching to be seamless.
    fn context_radius(&self) -> [usize; 3];

    fn name(&self) -> &str {
        "classifier"
    }
}

/// Deterministic pointwise classifier banding normalized intensity into
/// classes. Used for dry runs and tests.
#[derive(Debug, Clone)]
pub struct IntensityBandClassifier {
    bands: IntensityBandConfig,
}

impl IntensityBandClassifier {
    pub fn new(bands: IntensityBandConfig) -> Self {
        Self { bands }
    }

    /// Class for a single normalized intensity
    pub fn classify(&self, intensity: f32) -> VoxelClass {
        if intensity >= self.bands.soma_min {
            VoxelClass::Soma
        } else if intensity >= self.bands.axon_min {
            VoxelClass::Axon
        } else if intensity >= self.bands.dendrite_min {
            VoxelClass::Dendrite
        } else {
            VoxelClass::Background
        }
    }
}

impl Default for IntensityBandClassifier {
    fn default() -> Self {
        Self::new(IntensityBandConfig::default())
    }
}

impl Classifier for IntensityBandClassifier {
    fn predict(&self, tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        let (z, y, x) = tile.dim();
        let peak = self.bands.peak_probability;
        let rest = (1.0 - peak) / (VoxelClass::COUNT - 1) as f32;
        let mut output = Array4::from_elem((VoxelClass::COUNT, z, y, x), rest);
        Zip::from(output.lanes_mut(Axis(0)))
            .and(&tile)
            .for_each(|mut lane, &intensity| {
                lane[self.classify(intensity).channel()] = peak;
            });
        Ok(output)
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }

    fn name(&self) -> &str {
        "intensity-band"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_bands() {
        let classifier = IntensityBandClassifier::default();
        assert_eq!(classifier.classify(1.0), VoxelClass::Soma);
        assert_eq!(classifier.classify(0.6), VoxelClass::Axon);
        assert_eq!(classifier.classify(0.3), VoxelClass::Dendrite);
        assert_eq!(classifier.classify(0.0), VoxelClass::Background);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let classifier = IntensityBandClassifier::default();
        let tile = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z + y + x) as f32 / 7.0);
        let output = classifier.predict(tile.view()).unwrap();
        assert_eq!(output.dim(), (4, 2, 3, 4));
        for lane in output.lanes(Axis(0)) {
            assert!((lane.sum() - 1.0).abs() < 1e-5);
        }
    }
}
