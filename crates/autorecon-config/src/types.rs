// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `autorecon.toml`. Shapes and voxel sizes are always given in `[z, y, x]`
//! order.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoreconConfig {
    pub system: SystemConfig,
    pub volume: VolumeConfig,
    pub inference: InferenceConfig,
    pub graph: GraphConfig,
    pub relabel: RelabelConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutsConfig,
    pub checkpoint: CheckpointConfig,
    pub logging: LoggingConfig,
}

/// System-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Specimens reconstructed concurrently (0 = one per available core)
    pub max_parallel_specimens: usize,
    /// Checkpoints and intermediate artifacts, one sub-directory per specimen
    pub work_dir: PathBuf,
    /// Final SWC files and the batch report
    pub output_dir: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_parallel_specimens: 0,
            work_dir: PathBuf::from("autorecon_work"),
            output_dir: PathBuf::from("autorecon_output"),
        }
    }
}

impl SystemConfig {
    /// Worker count with `0` resolved against the machine
    pub fn resolved_parallelism(&self) -> usize {
        if self.max_parallel_specimens > 0 {
            return self.max_parallel_specimens;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Slice-stack loading
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Used when neither a sidecar file nor the manifest gives a voxel size
    pub default_voxel_size_um: [f64; 3],
    /// Sidecar file inside the stack directory holding `{"z", "y", "x"}`
    pub voxel_size_file: String,
    /// Flip intensities after normalization (bright background stacks)
    pub invert_intensity: bool,
    /// Accepted slice extensions, compared case-insensitively
    pub slice_extensions: Vec<String>,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            default_voxel_size_um: [1.0, 0.5, 0.5],
            voxel_size_file: "voxel_size.json".to_string(),
            invert_intensity: false,
            slice_extensions: vec![
                "tif".to_string(),
                "tiff".to_string(),
                "png".to_string(),
            ],
        }
    }
}

/// How overlapping tile predictions are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StitchPolicy {
    /// Each voxel comes from the one tile whose core contains it
    #[default]
    CoreCrop,
    /// Mean of every covering tile
    Average,
    /// Per-class maximum of every covering tile
    Maximum,
}

/// Segmentation inference
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Full tile extent handed to the classifier, margin included
    pub tile_shape: [usize; 3],
    /// Context margin on each side of a tile core
    pub margin: [usize; 3],
    pub stitch_policy: StitchPolicy,
    pub max_concurrent_tiles: usize,
    /// Upper bound on waiting for the next tile result
    pub tile_timeout_ms: u64,
    /// Built-in intensity classifier used for dry runs
    pub band: IntensityBandConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            tile_shape: [32, 128, 128],
            margin: [8, 32, 32],
            stitch_policy: StitchPolicy::CoreCrop,
            max_concurrent_tiles: 4,
            tile_timeout_ms: 60_000,
            band: IntensityBandConfig::default(),
        }
    }
}

impl InferenceConfig {
    /// Core extent implied by tile shape and margin (zero if the margin eats the tile)
    pub fn core_shape(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| {
            self.tile_shape[axis].saturating_sub(2 * self.margin[axis])
        })
    }
}

/// Thresholds of the intensity band classifier, on normalized intensity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntensityBandConfig {
    pub soma_min: f32,
    pub axon_min: f32,
    pub dendrite_min: f32,
    /// Probability assigned to the winning class
    pub peak_probability: f32,
}

impl Default for IntensityBandConfig {
    fn default() -> Self {
        Self {
            soma_min: 0.85,
            axon_min: 0.55,
            dendrite_min: 0.25,
            peak_probability: 0.85,
        }
    }
}

/// Label graph construction
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Voxels below this confidence are treated as background
    pub min_foreground_confidence: f32,
    /// Axon/dendrite components smaller than this are debris
    pub min_component_voxels: usize,
    /// Soma components smaller than this are debris
    pub min_soma_voxels: usize,
    /// Largest surface gap joined between fragments of different classes
    pub bridge_distance_um: f64,
    /// Terminal branches shorter than this are pruned
    pub min_spur_length_um: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_foreground_confidence: 0.3,
            min_component_voxels: 8,
            min_soma_voxels: 500,
            bridge_distance_um: 5.0,
            min_spur_length_um: 2.0,
        }
    }
}

/// Axon/dendrite correction
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelabelConfig {
    /// Majority fraction at which a segment's vote is taken as is
    pub majority_threshold: f64,
    /// Mean radius above which a segment looks dendritic
    pub axon_max_radius_um: f64,
    /// Radius coefficient of variation above which a segment looks dendritic
    pub axon_max_radius_cv: f64,
    /// Chord / path length above which a segment looks axonal
    pub straightness_threshold: f64,
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            majority_threshold: 0.7,
            axon_max_radius_um: 1.0,
            axon_max_radius_cv: 0.35,
            straightness_threshold: 0.85,
        }
    }
}

/// Backoff for transient I/O failures
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Stage timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Loading a stack or writing an output file
    pub io_timeout_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: 300_000,
        }
    }
}

/// Checkpoint and artifact handling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Resume specimens from their last completed stage
    pub resume: bool,
    /// Re-run specimens whose checkpoint records a terminal failure
    pub retry_failed: bool,
    /// Leave stage artifacts in the work directory after success
    pub keep_intermediate_artifacts: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            resume: true,
            retry_failed: false,
            keep_intermediate_artifacts: false,
        }
    }
}

/// Log files
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console level when no debug flag is given
    pub level: String,
    /// Root of the per-run log folders
    pub log_dir: PathBuf,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            retention_days: 14,
            retention_runs: 20,
        }
    }
}
