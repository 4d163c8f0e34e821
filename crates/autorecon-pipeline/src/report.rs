// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-specimen outcomes and the `batch_report.json` written at the end of a
//! batch.

use crate::checkpoint::write_atomic;
use crate::run::PipelineRun;
use crate::state::{RunState, Stage};
use autorecon_skeleton::{BuildSummary, MorphometrySummary, RelabelSummary};
use autorecon_structures::{FailureKind, ReconError, ReconResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const BATCH_REPORT_FILE: &str = "batch_report.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenReport {
    pub specimen_id: String,
    pub final_state: RunState,
    pub failed_stage: Option<Stage>,
    pub failure_kind: Option<FailureKind>,
    pub reason: Option<String>,
    pub needs_review: bool,
    /// Interrupted before finishing; `final_state` is the last checkpoint
    pub cancelled: bool,
    /// Stages actually executed by this invocation
    pub stages_run: Vec<Stage>,
    pub stage_timings_ms: BTreeMap<Stage, u64>,
    pub total_ms: u64,
    pub output: Option<PathBuf>,
    pub build: Option<BuildSummary>,
    pub relabel: Option<RelabelSummary>,
    pub morphometry: Option<MorphometrySummary>,
}

impl SpecimenReport {
    pub fn from_run(run: &PipelineRun, stages_run: Vec<Stage>, cancelled: bool, total_ms: u64) -> Self {
        let (failed_stage, failure_kind, reason) = match &run.state {
            RunState::Failed {
                stage,
                kind,
                reason,
            } => (Some(*stage), Some(*kind), Some(reason.clone())),
            _ => (None, None, None),
        };
        Self {
            specimen_id: run.specimen_id.clone(),
            final_state: run.state.clone(),
            failed_stage,
            failure_kind,
            reason,
            needs_review: failure_kind.map(|k| k.needs_manual_review()).unwrap_or(false),
            cancelled,
            stages_run,
            stage_timings_ms: run.stage_millis(),
            total_ms,
            output: run.output.clone(),
            build: run.build_summary.clone(),
            relabel: run.relabel_summary.clone(),
            morphometry: run.morphometry.clone(),
        }
    }

    /// Report for a specimen whose worker never produced a run record
    pub fn crashed(specimen_id: &str, stage: Stage, error: &ReconError) -> Self {
        let kind = error.kind();
        Self {
            specimen_id: specimen_id.to_string(),
            final_state: RunState::Failed {
                stage,
                kind,
                reason: error.to_string(),
            },
            failed_stage: Some(stage),
            failure_kind: Some(kind),
            reason: Some(error.to_string()),
            needs_review: kind.needs_manual_review(),
            cancelled: false,
            stages_run: Vec::new(),
            stage_timings_ms: BTreeMap::new(),
            total_ms: 0,
            output: None,
            build: None,
            relabel: None,
            morphometry: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.final_state == RunState::Done
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.final_state, RunState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub needs_review: usize,
    pub specimens: Vec<SpecimenReport>,
}

impl BatchReport {
    pub fn new(started_at: DateTime<Utc>, specimens: Vec<SpecimenReport>) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            total: specimens.len(),
            done: specimens.iter().filter(|s| s.is_done()).count(),
            failed: specimens.iter().filter(|s| s.is_failed()).count(),
            cancelled: specimens.iter().filter(|s| s.cancelled).count(),
            needs_review: specimens.iter().filter(|s| s.needs_review).count(),
            specimens,
        }
    }

    pub fn specimen(&self, id: &str) -> Option<&SpecimenReport> {
        self.specimens.iter().find(|s| s.specimen_id == id)
    }

    /// Write `batch_report.json` into `output_dir`
    pub fn write(&self, output_dir: &Path) -> ReconResult<PathBuf> {
        let path = output_dir.join(BATCH_REPORT_FILE);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ReconError::Serialization(format!("batch report: {}", e)))?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> ReconResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::from_io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&text)
            .map_err(|e| ReconError::Serialization(format!("batch report {}: {}", path.display(), e)))
    }

    pub fn log_summary(&self) {
        info!(
            target: "autorecon-pipeline",
            "[BATCH] {} specimens: {} done, {} failed, {} cancelled ({} need review) in {} ms",
            self.total,
            self.done,
            self.failed,
            self.cancelled,
            self.needs_review,
            (self.finished_at - self.started_at).num_milliseconds()
        );
        for specimen in self.specimens.iter().filter(|s| s.is_failed()) {
            warn!(
                target: "autorecon-pipeline",
                "[BATCH] {} {}",
                specimen.specimen_id,
                specimen.final_state
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_counts_and_file_round_trip() {
        let mut done = PipelineRun::new("a", PathBuf::from("in/a"), None);
        for stage in Stage::ALL {
            done.complete(stage, 5, None).unwrap();
        }
        done.finish().unwrap();

        let mut failed = PipelineRun::new("b", PathBuf::from("in/b"), None);
        failed.complete(Stage::Load, 5, None).unwrap();
        failed.complete(Stage::Segment, 5, None).unwrap();
        failed
            .fail(Stage::BuildGraph, &ReconError::TopologyViolation("no soma".into()))
            .unwrap();

        let pending = PipelineRun::new("c", PathBuf::from("in/c"), None);

        let report = BatchReport::new(
            Utc::now(),
            vec![
                SpecimenReport::from_run(&done, Stage::ALL.to_vec(), false, 25),
                SpecimenReport::from_run(&failed, vec![Stage::BuildGraph], false, 7),
                SpecimenReport::from_run(&pending, Vec::new(), true, 0),
            ],
        );
        assert_eq!((report.total, report.done, report.failed, report.cancelled), (3, 1, 1, 1));
        assert_eq!(report.needs_review, 1);
        let b = report.specimen("b").unwrap();
        assert_eq!(b.failed_stage, Some(Stage::BuildGraph));
        assert_eq!(b.failure_kind, Some(FailureKind::TopologyViolation));
        assert_eq!(b.stage_timings_ms.len(), 2);

        let dir = tempdir().unwrap();
        let path = report.write(dir.path()).unwrap();
        assert_eq!(BatchReport::read(&path).unwrap(), report);
    }
}
