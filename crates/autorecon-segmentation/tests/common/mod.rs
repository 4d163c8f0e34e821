// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use autorecon_config::InferenceConfig;
use autorecon_segmentation::{Classifier, ClassifierError};
use ndarray::{Array3, Array4, ArrayView3, Axis};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Small tiles so a test volume spans many of them
pub fn small_tiles(tile: usize, margin: usize) -> InferenceConfig {
    InferenceConfig {
        tile_shape: [tile, tile, tile],
        margin: [margin, margin, margin],
        max_concurrent_tiles: 3,
        tile_timeout_ms: 5_000,
        ..InferenceConfig::default()
    }
}

/// Writes one 8-bit PNG per z-plane
pub fn write_png_stack(dir: &Path, stack: &Array3<u8>) {
    let (_, height, width) = stack.dim();
    for (z, plane) in stack.axis_iter(Axis(0)).enumerate() {
        let pixels: Vec<u8> = plane.iter().copied().collect();
        let image = image::GrayImage::from_raw(width as u32, height as u32, pixels).unwrap();
        image.save(dir.join(format!("slice_{:04}.png", z))).unwrap();
    }
}

/// Scores soma by the mean intensity of the 3x3x3 neighborhood (zero outside
/// the tile), so predictions depend on context one voxel deep.
pub struct NeighborhoodMeanClassifier;

impl Classifier for NeighborhoodMeanClassifier {
    fn predict(&self, tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        let (nz, ny, nx) = tile.dim();
        let mut output = Array4::zeros((4, nz, ny, nx));
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let mut sum = 0.0f32;
                    for dz in -1i64..=1 {
                        for dy in -1i64..=1 {
                            for dx in -1i64..=1 {
                                let (zz, yy, xx) = (z as i64 + dz, y as i64 + dy, x as i64 + dx);
                                if zz >= 0 && yy >= 0 && xx >= 0 {
                                    if let Some(v) = tile.get((zz as usize, yy as usize, xx as usize)) {
                                        sum += *v;
                                    }
                                }
                            }
                        }
                    }
                    let soma = (sum / 27.0).clamp(0.0, 1.0);
                    output[[0, z, y, x]] = 1.0 - soma;
                    output[[1, z, y, x]] = soma;
                }
            }
        }
        Ok(output)
    }

    fn context_radius(&self) -> [usize; 3] {
        [1, 1, 1]
    }
}

/// Reports resource exhaustion for tiles larger than `max_voxels`
pub struct MemoryBoundClassifier {
    pub max_voxels: usize,
    pub calls: AtomicUsize,
}

impl Classifier for MemoryBoundClassifier {
    fn predict(&self, tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if tile.len() > self.max_voxels {
            return Err(ClassifierError::ResourceExhausted(format!(
                "{} voxels do not fit",
                tile.len()
            )));
        }
        let (z, y, x) = tile.dim();
        let mut output = Array4::zeros((4, z, y, x));
        output.index_axis_mut(Axis(0), 2).fill(1.0);
        Ok(output)
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }
}

/// Fails on every tile
pub struct BrokenClassifier;

impl Classifier for BrokenClassifier {
    fn predict(&self, _tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        Err(ClassifierError::Failed("weights not loaded".to_string()))
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }
}

/// Returns three channels instead of four
pub struct WrongShapeClassifier;

impl Classifier for WrongShapeClassifier {
    fn predict(&self, tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        let (z, y, x) = tile.dim();
        Ok(Array4::zeros((3, z, y, x)))
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }
}

/// Sleeps before answering
pub struct SlowClassifier {
    pub delay: Duration,
}

impl Classifier for SlowClassifier {
    fn predict(&self, tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        std::thread::sleep(self.delay);
        let (z, y, x) = tile.dim();
        let mut output = Array4::zeros((4, z, y, x));
        output.index_axis_mut(Axis(0), 0).fill(1.0);
        Ok(output)
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }
}
