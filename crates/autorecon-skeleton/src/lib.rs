// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # autorecon-skeleton
//!
//! Middle and last stages of a reconstruction:
//!
//! - [`GraphBuilder`]: label volume → uncorrected tree (components, thinning,
//!   radius, bridging, rooting, spur pruning)
//! - [`Relabeler`]: one top-down pass fixing axon/dendrite types per segment
//! - [`swc`]: SWC writer and reader, plus [`MorphometrySummary`]

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod builder;
pub mod components;
pub mod morphometry;
pub mod radius;
pub mod relabel;
pub mod swc;
pub mod thinning;

pub use builder::{BuildSummary, GraphBuilder};
pub use components::{extract_components, Component, ComponentSet};
pub use morphometry::MorphometrySummary;
pub use relabel::{RelabelSummary, Relabeler};
pub use swc::{parse_swc, quantize, quantized, read_swc, stage_swc, to_swc_string, write_swc};
