// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures values are within valid ranges and consistent with each other
//! before any specimen is touched.

use crate::{AutoreconConfig, ConfigError, ConfigResult};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
    Inconsistent { fields: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::Inconsistent { fields, reason } => {
                write!(f, "Inconsistent configuration ({}): {}", fields, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Required paths
/// - Tile geometry (tile larger than twice the margin on every axis)
/// - Probability and fraction ranges
/// - Positive timeouts, sizes and backoff settings
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation found
pub fn validate_config(config: &AutoreconConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_volume(config, &mut errors);
    validate_inference(config, &mut errors);
    validate_graph_and_relabel(config, &mut errors);
    validate_retry_and_timeouts(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn invalid(errors: &mut Vec<ConfigValidationError>, field: &str, reason: &str) {
    errors.push(ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    });
}

fn validate_required_fields(config: &AutoreconConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.system.work_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "system.work_dir".to_string(),
        });
    }
    if config.system.output_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "system.output_dir".to_string(),
        });
    }
    if config.volume.voxel_size_file.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "volume.voxel_size_file".to_string(),
        });
    }
    if config.volume.slice_extensions.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "volume.slice_extensions".to_string(),
        });
    }
}

fn validate_volume(config: &AutoreconConfig, errors: &mut Vec<ConfigValidationError>) {
    if config
        .volume
        .default_voxel_size_um
        .iter()
        .any(|v| !v.is_finite() || *v <= 0.0)
    {
        invalid(errors, "volume.default_voxel_size_um", "every axis must be positive");
    }
}

fn validate_inference(config: &AutoreconConfig, errors: &mut Vec<ConfigValidationError>) {
    let inference = &config.inference;
    for (axis, name) in ["z", "y", "x"].iter().enumerate() {
        if inference.tile_shape[axis] <= 2 * inference.margin[axis] {
            errors.push(ConfigValidationError::Inconsistent {
                fields: "inference.tile_shape, inference.margin".to_string(),
                reason: format!(
                    "tile extent {} along {} must exceed twice the margin {}",
                    inference.tile_shape[axis], name, inference.margin[axis]
                ),
            });
        }
    }
    if inference.max_concurrent_tiles == 0 {
        invalid(errors, "inference.max_concurrent_tiles", "must be at least 1");
    }
    if inference.tile_timeout_ms == 0 {
        invalid(errors, "inference.tile_timeout_ms", "must be positive");
    }

    let band = &inference.band;
    let ordered = 0.0 <= band.dendrite_min
        && band.dendrite_min <= band.axon_min
        && band.axon_min <= band.soma_min
        && band.soma_min <= 1.0;
    if !ordered {
        invalid(
            errors,
            "inference.band",
            "thresholds must satisfy 0 <= dendrite_min <= axon_min <= soma_min <= 1",
        );
    }
    if !(0.25..=1.0).contains(&band.peak_probability) {
        invalid(errors, "inference.band.peak_probability", "must be between 0.25 and 1.0");
    }
}

fn validate_graph_and_relabel(config: &AutoreconConfig, errors: &mut Vec<ConfigValidationError>) {
    let graph = &config.graph;
    if !(0.0..=1.0).contains(&graph.min_foreground_confidence) {
        invalid(errors, "graph.min_foreground_confidence", "must be between 0.0 and 1.0");
    }
    if graph.min_soma_voxels == 0 {
        invalid(errors, "graph.min_soma_voxels", "must be at least 1");
    }
    if !graph.bridge_distance_um.is_finite() || graph.bridge_distance_um < 0.0 {
        invalid(errors, "graph.bridge_distance_um", "must be non-negative");
    }
    if !graph.min_spur_length_um.is_finite() || graph.min_spur_length_um < 0.0 {
        invalid(errors, "graph.min_spur_length_um", "must be non-negative");
    }

    let relabel = &config.relabel;
    if !(0.5..=1.0).contains(&relabel.majority_threshold) {
        invalid(errors, "relabel.majority_threshold", "must be between 0.5 and 1.0");
    }
    if !relabel.axon_max_radius_um.is_finite() || relabel.axon_max_radius_um <= 0.0 {
        invalid(errors, "relabel.axon_max_radius_um", "must be positive");
    }
    if !relabel.axon_max_radius_cv.is_finite() || relabel.axon_max_radius_cv <= 0.0 {
        invalid(errors, "relabel.axon_max_radius_cv", "must be positive");
    }
    if !(0.0..=1.0).contains(&relabel.straightness_threshold) {
        invalid(errors, "relabel.straightness_threshold", "must be between 0.0 and 1.0");
    }
}

fn validate_retry_and_timeouts(config: &AutoreconConfig, errors: &mut Vec<ConfigValidationError>) {
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        invalid(errors, "retry.max_attempts", "must be at least 1");
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        invalid(errors, "retry.backoff_multiplier", "must be at least 1.0");
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        errors.push(ConfigValidationError::Inconsistent {
            fields: "retry.initial_backoff_ms, retry.max_backoff_ms".to_string(),
            reason: "initial backoff exceeds the maximum".to_string(),
        });
    }
    if config.timeouts.io_timeout_ms == 0 {
        invalid(errors, "timeouts.io_timeout_ms", "must be positive");
    }
}
