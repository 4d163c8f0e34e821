// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The run record persisted next to a specimen's checkpoints.

use crate::state::{RunState, Stage};
use autorecon_skeleton::{BuildSummary, MorphometrySummary, RelabelSummary};
use autorecon_structures::{ReconError, ReconResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Wall time spent in one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub millis: u64,
    pub finished_at: DateTime<Utc>,
}

/// Progress of one specimen across batch invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub specimen_id: String,
    pub input: PathBuf,
    #[serde(default)]
    pub voxel_size_um: Option<[f64; 3]>,
    pub state: RunState,
    /// Checkpoint files by the stage that produced them
    #[serde(default)]
    pub artifacts: BTreeMap<Stage, PathBuf>,
    #[serde(default)]
    pub timings: Vec<StageTiming>,
    /// Batch invocations that touched this specimen
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub build_summary: Option<BuildSummary>,
    #[serde(default)]
    pub relabel_summary: Option<RelabelSummary>,
    #[serde(default)]
    pub morphometry: Option<MorphometrySummary>,
}

impl PipelineRun {
    pub fn new(specimen_id: impl Into<String>, input: PathBuf, voxel_size_um: Option<[f64; 3]>) -> Self {
        let now = Utc::now();
        Self {
            specimen_id: specimen_id.into(),
            input,
            voxel_size_um,
            state: RunState::Pending,
            artifacts: BTreeMap::new(),
            timings: Vec::new(),
            attempts: 0,
            created_at: now,
            updated_at: now,
            output: None,
            build_summary: None,
            relabel_summary: None,
            morphometry: None,
        }
    }

    /// Record a successful stage and move to its completed state
    pub fn complete(&mut self, stage: Stage, millis: u64, artifact: Option<PathBuf>) -> ReconResult<()> {
        self.state = self.state.transition(stage.completed_state())?;
        if let Some(path) = artifact {
            self.artifacts.insert(stage, path);
        }
        let now = Utc::now();
        self.timings.push(StageTiming {
            stage,
            millis,
            finished_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, stage: Stage, error: &ReconError) -> ReconResult<()> {
        self.state = self.state.transition(RunState::Failed {
            stage,
            kind: error.kind(),
            reason: error.to_string(),
        })?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn finish(&mut self) -> ReconResult<()> {
        self.state = self.state.transition(RunState::Done)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Put a failed specimen back where its last good checkpoint left it
    pub fn rewind_failure(&mut self) {
        if let RunState::Failed { stage, .. } = &self.state {
            let resume = stage.starting_state();
            self.artifacts.retain(|s, _| *s < *stage);
            self.state = resume;
            self.updated_at = Utc::now();
        }
    }

    /// Milliseconds per stage, summed over every attempt
    pub fn stage_millis(&self) -> BTreeMap<Stage, u64> {
        let mut totals = BTreeMap::new();
        for timing in &self.timings {
            *totals.entry(timing.stage).or_insert(0) += timing.millis;
        }
        totals
    }

    pub fn times_completed(&self, stage: Stage) -> usize {
        self.timings.iter().filter(|t| t.stage == stage).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autorecon_structures::FailureKind;

    #[test]
    fn test_complete_and_fail() {
        let mut run = PipelineRun::new("s1", PathBuf::from("/data/s1"), None);
        run.complete(Stage::Load, 12, Some(PathBuf::from("volume.bin"))).unwrap();
        assert_eq!(run.state, RunState::Loaded);
        assert!(run.complete(Stage::BuildGraph, 1, None).is_err());

        run.fail(Stage::Segment, &ReconError::ResourceExhausted("gpu".into()))
            .unwrap();
        match &run.state {
            RunState::Failed { stage, kind, .. } => {
                assert_eq!(*stage, Stage::Segment);
                assert_eq!(*kind, FailureKind::ResourceExhaustion);
            }
            other => panic!("unexpected {:?}", other),
        }

        run.rewind_failure();
        assert_eq!(run.state, RunState::Loaded);
        assert!(run.artifacts.contains_key(&Stage::Load));
        assert_eq!(run.stage_millis()[&Stage::Load], 12);
        assert_eq!(run.times_completed(Stage::Load), 1);
    }

    #[test]
    fn test_record_json_round_trip() {
        let mut run = PipelineRun::new("s2", PathBuf::from("in"), Some([2.0, 0.5, 0.5]));
        run.complete(Stage::Load, 3, Some(PathBuf::from("w/volume.bin"))).unwrap();
        let json = serde_json::to_string(&run).unwrap();
        let back: PipelineRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}
