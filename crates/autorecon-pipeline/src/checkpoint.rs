// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Checkpoint directory of one specimen: `run.json` plus one bincode artifact
//! per completed stage. Every write goes to a temp file in the same directory
//! and is renamed into place, so a crash never leaves a half-written file.

use crate::manifest::validate_specimen_id;
use crate::run::PipelineRun;
use crate::state::Stage;
pub use autorecon_structures::write_atomic;
use autorecon_structures::{ReconError, ReconResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const RUN_RECORD_FILE: &str = "run.json";

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store for `specimen_id` under `work_dir`. Ids that are not a single
    /// path component are refused before anything touches the disk.
    pub fn new(work_dir: &Path, specimen_id: &str) -> ReconResult<Self> {
        validate_specimen_id(specimen_id)?;
        Ok(Self {
            dir: work_dir.join(specimen_id),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_path(&self) -> PathBuf {
        self.dir.join(RUN_RECORD_FILE)
    }

    pub fn artifact_path(&self, stage: Stage) -> Option<PathBuf> {
        stage.artifact_file().map(|name| self.dir.join(name))
    }

    /// The saved run record, or `None` if this specimen never started
    pub fn load_run(&self) -> ReconResult<Option<PipelineRun>> {
        let path = self.run_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| ReconError::from_io(format!("reading {}", path.display()), e))?;
        let run = serde_json::from_str(&text).map_err(|e| {
            ReconError::Serialization(format!("run record {}: {}", path.display(), e))
        })?;
        Ok(Some(run))
    }

    pub fn save_run(&self, run: &PipelineRun) -> ReconResult<()> {
        let json = serde_json::to_vec_pretty(run)
            .map_err(|e| ReconError::Serialization(format!("run record: {}", e)))?;
        write_atomic(&self.run_path(), &json)?;
        debug!(
            target: "autorecon-pipeline",
            "[CHECKPOINT] {} -> {}",
            run.specimen_id,
            run.state.name()
        );
        Ok(())
    }

    /// Persist a stage output, returning where it went
    pub fn save_artifact<T: Serialize>(&self, stage: Stage, value: &T) -> ReconResult<PathBuf> {
        let path = self.artifact_path(stage).ok_or_else(|| {
            ReconError::Internal(format!("stage {} keeps no artifact", stage))
        })?;
        let bytes = bincode::serialize(value)
            .map_err(|e| ReconError::Serialization(format!("{} artifact: {}", stage, e)))?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    pub fn load_artifact<T: DeserializeOwned>(&self, stage: Stage) -> ReconResult<T> {
        let path = self.artifact_path(stage).ok_or_else(|| {
            ReconError::Internal(format!("stage {} keeps no artifact", stage))
        })?;
        let bytes = fs::read(&path)
            .map_err(|e| ReconError::from_io(format!("reading {}", path.display()), e))?;
        bincode::deserialize(&bytes).map_err(|e| {
            ReconError::Serialization(format!("{} artifact {}: {}", stage, path.display(), e))
        })
    }

    /// Delete every stage artifact, keeping the run record
    pub fn remove_artifacts(&self) {
        for stage in Stage::ALL {
            let Some(path) = self.artifact_path(stage) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    target: "autorecon-pipeline",
                    "[CHECKPOINT] could not remove {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }

    /// Forget this specimen entirely
    pub fn clear(&self) -> ReconResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReconError::from_io(format!("removing {}", self.dir.display()), e)),
        }
    }
}
