// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # autorecon-observability
//!
//! Logging infrastructure shared by the autorecon binaries.
//!
//! Every library crate logs through `tracing` with its crate name as the
//! explicit target (`target: "autorecon-skeleton"`), which is what the
//! per-crate debug flags and per-crate log files key on.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known autorecon crate names for debug flags and per-crate log files
pub const KNOWN_CRATES: &[&str] = &[
    "autorecon-config",
    "autorecon-segmentation",
    "autorecon-skeleton",
    "autorecon-pipeline",
    "autorecon-cli",
];
