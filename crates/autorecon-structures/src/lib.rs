// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The core crate for autorecon. Defines the data model every reconstruction
//! stage hands to the next one:
//!
//! - [`Volume`]: normalized intensity stack with physical voxel spacing
//! - [`LabelVolume`]: per-voxel class + confidence produced by inference
//! - [`SkeletonGraph`]: arena-backed, typed, radius-annotated neuron tree
//!
//! plus the [`ReconError`] taxonomy shared by all stages and the atomic
//! file writes every output goes through.
//!
//! Index conventions: voxel indices are `[z, y, x]` (slice-major, the order the
//! stacks are read in); physical positions are `[x, y, z]` in micrometers (the
//! order SWC files use).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod atomic;
mod error;
pub mod labels;
pub mod skeleton;
pub mod volume;

pub use atomic::{stage_write, write_atomic, StagedFile};
pub use error::{FailureKind, ReconError, ReconResult};
pub use labels::{LabelVolume, VoxelClass};
pub use skeleton::{NeuriteType, NodeId, SkeletonGraph, SkeletonNode};
pub use volume::{physical_distance, Position, Volume, VoxelIndex, VoxelSpacing};
