// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{AutoreconConfig, ConfigError, ConfigResult, StitchPolicy};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "autorecon.toml";

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "AUTORECON_CONFIG_PATH";

/// Find the autorecon configuration file
///
/// Search order:
/// 1. `AUTORECON_CONFIG_PATH` environment variable
/// 2. Current working directory: `./autorecon.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "Configuration file '{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the config file is not found or contains invalid TOML.
/// Validation is left to [`crate::validate_config`] so callers can report
/// every problem at once.
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<AutoreconConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: AutoreconConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower == "true" || lower == "1" || lower == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `AUTORECON_MAX_PARALLEL_SPECIMENS` -> `system.max_parallel_specimens`
/// - `AUTORECON_WORK_DIR` -> `system.work_dir`
/// - `AUTORECON_OUTPUT_DIR` -> `system.output_dir`
/// - `AUTORECON_MAX_CONCURRENT_TILES` -> `inference.max_concurrent_tiles`
/// - `AUTORECON_TILE_TIMEOUT_MS` -> `inference.tile_timeout_ms`
/// - `AUTORECON_IO_TIMEOUT_MS` -> `timeouts.io_timeout_ms`
/// - `AUTORECON_RETRY_FAILED` -> `checkpoint.retry_failed`
/// - `AUTORECON_KEEP_INTERMEDIATE` -> `checkpoint.keep_intermediate_artifacts`
/// - `AUTORECON_LOG_DIR` -> `logging.log_dir`
/// - `AUTORECON_LOG_LEVEL` -> `logging.level`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut AutoreconConfig) {
    if let Ok(value) = env::var("AUTORECON_MAX_PARALLEL_SPECIMENS") {
        if let Ok(n) = value.parse::<usize>() {
            config.system.max_parallel_specimens = n;
        }
    }
    if let Ok(value) = env::var("AUTORECON_WORK_DIR") {
        config.system.work_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("AUTORECON_OUTPUT_DIR") {
        config.system.output_dir = PathBuf::from(value);
    }

    if let Ok(value) = env::var("AUTORECON_MAX_CONCURRENT_TILES") {
        if let Ok(n) = value.parse::<usize>() {
            config.inference.max_concurrent_tiles = n;
        }
    }
    if let Ok(value) = env::var("AUTORECON_TILE_TIMEOUT_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.inference.tile_timeout_ms = ms;
        }
    }
    if let Ok(value) = env::var("AUTORECON_IO_TIMEOUT_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.timeouts.io_timeout_ms = ms;
        }
    }

    if let Ok(value) = env::var("AUTORECON_RETRY_FAILED") {
        config.checkpoint.retry_failed = parse_bool(&value);
    }
    if let Ok(value) = env::var("AUTORECON_KEEP_INTERMEDIATE") {
        config.checkpoint.keep_intermediate_artifacts = parse_bool(&value);
    }

    if let Ok(value) = env::var("AUTORECON_LOG_DIR") {
        config.logging.log_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("AUTORECON_LOG_LEVEL") {
        config.logging.level = value;
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(format!("cannot parse '{}' for override '{}'", value, key))
    })
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"workers": "8", "output_dir": "/data/swc"}`)
///
/// Unlike environment overrides, a CLI value that does not parse is an error:
/// the user typed it on purpose.
pub fn apply_cli_overrides(
    config: &mut AutoreconConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("workers") {
        config.system.max_parallel_specimens = parse_override("workers", value)?;
    }
    if let Some(value) = cli_args.get("work_dir") {
        config.system.work_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("output_dir") {
        config.system.output_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("max_concurrent_tiles") {
        config.inference.max_concurrent_tiles = parse_override("max_concurrent_tiles", value)?;
    }
    if let Some(value) = cli_args.get("stitch_policy") {
        config.inference.stitch_policy = match value.as_str() {
            "core_crop" => StitchPolicy::CoreCrop,
            "average" => StitchPolicy::Average,
            "maximum" => StitchPolicy::Maximum,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "unknown stitch policy '{}', expected core_crop, average or maximum",
                    other
                )))
            }
        };
    }
    if let Some(value) = cli_args.get("invert_intensity") {
        config.volume.invert_intensity = parse_bool(value);
    }
    if let Some(value) = cli_args.get("retry_failed") {
        config.checkpoint.retry_failed = parse_bool(value);
    }
    if let Some(value) = cli_args.get("keep_intermediate") {
        config.checkpoint.keep_intermediate_artifacts = parse_bool(value);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    Ok(())
}
