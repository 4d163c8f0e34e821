// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-voxel class labels produced by segmentation inference.

use crate::error::{ReconError, ReconResult};
use crate::volume::{VoxelIndex, VoxelSpacing};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

/// The four-class label schema. Discriminants double as classifier channel
/// indices and SWC type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum VoxelClass {
    #[default]
    Background = 0,
    Soma = 1,
    Axon = 2,
    Dendrite = 3,
}

impl VoxelClass {
    /// Number of classifier output channels
    pub const COUNT: usize = 4;

    /// Every class in channel order
    pub const ALL: [VoxelClass; 4] = [
        VoxelClass::Background,
        VoxelClass::Soma,
        VoxelClass::Axon,
        VoxelClass::Dendrite,
    ];

    /// Classes that end up in the skeleton
    pub const FOREGROUND: [VoxelClass; 3] =
        [VoxelClass::Soma, VoxelClass::Axon, VoxelClass::Dendrite];

    pub fn channel(self) -> usize {
        self as usize
    }

    pub fn from_channel(channel: usize) -> Option<Self> {
        Self::ALL.get(channel).copied()
    }

    pub fn is_foreground(self) -> bool {
        self != VoxelClass::Background
    }
}

/// Label + confidence per voxel, same extent as the source volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelVolume {
    labels: Array3<VoxelClass>,
    confidence: Array3<f32>,
    spacing: VoxelSpacing,
}

impl LabelVolume {
    pub fn new(
        labels: Array3<VoxelClass>,
        confidence: Array3<f32>,
        spacing: VoxelSpacing,
    ) -> ReconResult<Self> {
        spacing.validate()?;
        if labels.dim() != confidence.dim() {
            return Err(ReconError::MalformedInput(format!(
                "label shape {:?} does not match confidence shape {:?}",
                labels.dim(),
                confidence.dim()
            )));
        }
        if confidence.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ReconError::MalformedInput(
                "confidence values must lie in [0, 1]".to_string(),
            ));
        }
        Ok(Self {
            labels,
            confidence,
            spacing,
        })
    }

    /// Build a fully confident label volume, mostly useful for tests and for
    /// importing curated masks.
    pub fn from_labels(labels: Array3<VoxelClass>, spacing: VoxelSpacing) -> ReconResult<Self> {
        let confidence = Array3::from_elem(labels.raw_dim(), 1.0f32);
        Self::new(labels, confidence, spacing)
    }

    /// `[z, y, x]` extent
    pub fn shape(&self) -> [usize; 3] {
        let dim = self.labels.dim();
        [dim.0, dim.1, dim.2]
    }

    pub fn spacing(&self) -> VoxelSpacing {
        self.spacing
    }

    pub fn labels(&self) -> ArrayView3<'_, VoxelClass> {
        self.labels.view()
    }

    pub fn confidence(&self) -> ArrayView3<'_, f32> {
        self.confidence.view()
    }

    pub fn class_at(&self, index: VoxelIndex) -> Option<VoxelClass> {
        self.labels.get(index).copied()
    }

    pub fn confidence_at(&self, index: VoxelIndex) -> Option<f32> {
        self.confidence.get(index).copied()
    }

    pub fn count(&self, class: VoxelClass) -> usize {
        self.labels.iter().filter(|&&c| c == class).count()
    }
}
