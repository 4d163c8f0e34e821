// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # autorecon
//!
//! Automated reconstruction of single neurons from 3-D microscopy slice
//! stacks. A specimen goes through five stages:
//!
//! 1. **Load**: slice images become a normalized intensity [`Volume`](structures::Volume)
//! 2. **Segment**: a voxel classifier runs over overlapping tiles, stitched into a label volume
//! 3. **Build graph**: labels are thinned into a tree rooted at the soma
//! 4. **Relabel**: axon/dendrite types are corrected segment by segment
//! 5. **Write**: the tree is written as an SWC file
//!
//! ## Feature Flags
//!
//! - **`pipeline`** (default): batch orchestration with checkpoints and reports
//! - **`segmentation`**: volume loading and tiled inference only
//! - **`skeleton`**: graph building, relabeling and SWC I/O only
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autorecon::prelude::*;
//! use std::path::Path;
//!
//! let config = load_config(None, None).unwrap_or_default();
//! let manifest = discover_specimens(Path::new("stacks"))?;
//! let report = Pipeline::new(config).run_batch(&manifest.specimens)?;
//! for specimen in &report.specimens {
//!     println!("{}: {}", specimen.specimen_id, specimen.final_state);
//! }
//! # Ok::<(), ReconError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Foundation
pub use autorecon_config as config;
pub use autorecon_observability as observability;
pub use autorecon_structures as structures;

// Stages
#[cfg(feature = "segmentation")]
pub use autorecon_segmentation as segmentation;

#[cfg(feature = "skeleton")]
pub use autorecon_skeleton as skeleton;

// Orchestration
#[cfg(feature = "pipeline")]
pub use autorecon_pipeline as pipeline;

/// Commonly used types and functions
pub mod prelude {
    pub use crate::config::{load_config, validate_config, AutoreconConfig};
    pub use crate::structures::{
        FailureKind, LabelVolume, NeuriteType, NodeId, ReconError, ReconResult, SkeletonGraph,
        SkeletonNode, Volume, VoxelClass, VoxelSpacing,
    };

    #[cfg(feature = "segmentation")]
    pub use crate::segmentation::{load_volume, Classifier, IntensityBandClassifier, SegmentationEngine};

    #[cfg(feature = "skeleton")]
    pub use crate::skeleton::{read_swc, write_swc, GraphBuilder, MorphometrySummary, Relabeler};

    #[cfg(feature = "pipeline")]
    pub use crate::pipeline::{
        discover_specimens, load_manifest, BatchReport, Pipeline, RunState, SpecimenReport,
        SpecimenSpec, Stage,
    };
}
