// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Autorecon Configuration System
//!
//! Type-safe configuration loader for the reconstruction pipeline with support for:
//! - TOML file parsing
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autorecon_config::{load_config, AutoreconConfig};
//!
//! // Load configuration with automatic file discovery and overrides
//! let config = load_config(None, None).expect("Failed to load config");
//!
//! println!("Parallel specimens: {}", config.system.max_parallel_specimens);
//! println!("Tile shape: {:?}", config.inference.tile_shape);
//! ```
//!
//! Every tunable threshold of the pipeline lives here with a default; no stage
//! hardcodes its own constants.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_types_compile() {
        let _config = AutoreconConfig::default();
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = AutoreconConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AutoreconConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.inference.tile_shape, config.inference.tile_shape);
        assert_eq!(parsed.inference.stitch_policy, config.inference.stitch_policy);
        assert_eq!(parsed.relabel.majority_threshold, config.relabel.majority_threshold);
    }

    #[test]
    fn test_example_file_lists_the_defaults() {
        let text = include_str!("../../../autorecon.example.toml");
        let parsed: AutoreconConfig = toml::from_str(text).unwrap();
        assert_eq!(
            toml::to_string(&parsed).unwrap(),
            toml::to_string(&AutoreconConfig::default()).unwrap()
        );
    }
}
