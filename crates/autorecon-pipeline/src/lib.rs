// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # autorecon-pipeline
//!
//! Drives batches of specimens through load, segmentation, graph building,
//! relabeling and SWC output. Each specimen carries a checkpointed
//! [`PipelineRun`] so an interrupted batch picks up where it stopped, and
//! every batch ends with a [`BatchReport`].
//!
//! ```no_run
//! use autorecon_config::AutoreconConfig;
//! use autorecon_pipeline::{discover_specimens, Pipeline};
//! use std::path::Path;
//!
//! let manifest = discover_specimens(Path::new("stacks"))?;
//! let pipeline = Pipeline::new(AutoreconConfig::default());
//! let report = pipeline.run_batch(&manifest.specimens)?;
//! println!("{} of {} done", report.done, report.total);
//! # Ok::<(), autorecon_structures::ReconError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod checkpoint;
pub mod context;
pub mod manifest;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod run;
pub mod state;
pub mod timeout;

pub use checkpoint::{write_atomic, CheckpointStore, RUN_RECORD_FILE};
pub use context::{Outcome, Progress, RunContext};
pub use manifest::{discover_specimens, load_manifest, parse_manifest, BatchManifest, SpecimenSpec};
pub use orchestrator::Pipeline;
pub use report::{BatchReport, SpecimenReport, BATCH_REPORT_FILE};
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use run::{PipelineRun, StageTiming};
pub use state::{RunState, Stage};
pub use timeout::{run_with_timeout, write_with_timeout};
