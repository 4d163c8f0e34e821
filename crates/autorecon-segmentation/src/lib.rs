// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # autorecon-segmentation
//!
//! First two stages of a reconstruction: reading a slice stack into a
//! [`Volume`](autorecon_structures::Volume) and turning it into a
//! [`LabelVolume`](autorecon_structures::LabelVolume) with a tiled
//! [`Classifier`].
//!
//! The classifier itself is an external collaborator; this crate only owns
//! tiling, worker dispatch, stitching and failure handling around it.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod classifier;
pub mod engine;
pub mod loader;
pub mod stitching;
pub mod tiling;

pub use classifier::{Classifier, ClassifierError, IntensityBandClassifier};
pub use engine::SegmentationEngine;
pub use loader::{list_slices, load_volume, read_voxel_size_sidecar, resolve_spacing};
pub use stitching::Stitcher;
pub use tiling::{Tile, TileGrid};
