// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use autorecon_config::{AutoreconConfig, GraphConfig, InferenceConfig, RetryConfig};
use autorecon_pipeline::SpecimenSpec;
use autorecon_segmentation::{Classifier, ClassifierError};
use ndarray::{Array3, Array4, ArrayView3, Axis};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const SHAPE: (usize, usize, usize) = (11, 11, 40);
const SOMA_CENTER: [usize; 3] = [5, 5, 6];
const SOMA_RADIUS: f64 = 4.0;

/// Small tiles, fast retries and per-test directories
pub fn test_config(root: &Path) -> AutoreconConfig {
    let mut config = AutoreconConfig::default();
    config.system.max_parallel_specimens = 2;
    config.system.work_dir = root.join("work");
    config.system.output_dir = root.join("out");
    config.inference = InferenceConfig {
        tile_shape: [8, 8, 16],
        margin: [1, 1, 1],
        max_concurrent_tiles: 2,
        tile_timeout_ms: 10_000,
        ..InferenceConfig::default()
    };
    config.graph = GraphConfig {
        min_foreground_confidence: 0.5,
        min_component_voxels: 5,
        min_soma_voxels: 50,
        bridge_distance_um: 5.0,
        min_spur_length_um: 2.0,
    };
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
    };
    config.timeouts.io_timeout_ms = 30_000;
    config
}

/// Bright soma ball (255) with a dimmer 3x3 axon tube (180) along +x
pub fn neuron_stack() -> Array3<u8> {
    let mut stack = Array3::zeros(SHAPE);
    for ((z, y, x), value) in stack.indexed_iter_mut() {
        let d2 = [z, y, x]
            .iter()
            .zip(SOMA_CENTER)
            .map(|(&a, c)| (a as f64 - c as f64).powi(2))
            .sum::<f64>();
        if d2 <= SOMA_RADIUS * SOMA_RADIUS {
            *value = 255;
        } else if (4..7).contains(&z) && (4..7).contains(&y) && (11..38).contains(&x) {
            *value = 180;
        }
    }
    stack
}

/// The tube alone, plus one bright voxel too small to count as a soma
pub fn stack_without_soma() -> Array3<u8> {
    let mut stack = Array3::zeros(SHAPE);
    for ((z, y, x), value) in stack.indexed_iter_mut() {
        if (4..7).contains(&z) && (4..7).contains(&y) && (11..38).contains(&x) {
            *value = 180;
        }
    }
    stack[[0, 0, 0]] = 255;
    stack
}

/// One 8-bit PNG per z-plane under `root/<id>`, isotropic 1 um voxels
pub fn write_specimen(root: &Path, id: &str, stack: &Array3<u8>) -> SpecimenSpec {
    let dir = root.join("stacks").join(id);
    fs::create_dir_all(&dir).unwrap();
    let (_, height, width) = stack.dim();
    for (z, plane) in stack.axis_iter(Axis(0)).enumerate() {
        let pixels: Vec<u8> = plane.iter().copied().collect();
        let image = image::GrayImage::from_raw(width as u32, height as u32, pixels).unwrap();
        image.save(dir.join(format!("slice_{:04}.png", z))).unwrap();
    }
    SpecimenSpec::new(id, dir).with_voxel_size([1.0, 1.0, 1.0])
}

/// A specimen directory without any slices
pub fn empty_specimen(root: &Path, id: &str) -> SpecimenSpec {
    let dir = root.join("stacks").join(id);
    fs::create_dir_all(&dir).unwrap();
    SpecimenSpec::new(id, dir).with_voxel_size([1.0, 1.0, 1.0])
}

/// Always runs out of memory
#[derive(Default)]
pub struct ExhaustedClassifier {
    pub calls: AtomicUsize,
}

impl Classifier for ExhaustedClassifier {
    fn predict(&self, _tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ClassifierError::ResourceExhausted("out of device memory".to_string()))
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }
}

/// Panics on every tile
pub struct PanickingClassifier;

impl Classifier for PanickingClassifier {
    fn predict(&self, _tile: ArrayView3<'_, f32>) -> Result<Array4<f32>, ClassifierError> {
        panic!("model weights corrupted")
    }

    fn context_radius(&self) -> [usize; 3] {
        [0, 0, 0]
    }
}
