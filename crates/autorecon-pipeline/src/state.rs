// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-specimen progress state machine.
//!
//! ```text
//! Pending → Loaded → Segmented → GraphBuilt → Relabeled → Written → Done
//!     \________\__________\___________\___________\_________→ Failed
//! ```

use autorecon_structures::{FailureKind, ReconError, ReconResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One unit of work that moves a specimen to the next state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Segment,
    BuildGraph,
    Relabel,
    Write,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Load,
        Stage::Segment,
        Stage::BuildGraph,
        Stage::Relabel,
        Stage::Write,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Segment => "segment",
            Stage::BuildGraph => "build_graph",
            Stage::Relabel => "relabel",
            Stage::Write => "write",
        }
    }

    /// State reached when this stage succeeds
    pub fn completed_state(self) -> RunState {
        match self {
            Stage::Load => RunState::Loaded,
            Stage::Segment => RunState::Segmented,
            Stage::BuildGraph => RunState::GraphBuilt,
            Stage::Relabel => RunState::Relabeled,
            Stage::Write => RunState::Written,
        }
    }

    /// State the specimen was in before this stage ran
    pub fn starting_state(self) -> RunState {
        match self {
            Stage::Load => RunState::Pending,
            Stage::Segment => RunState::Loaded,
            Stage::BuildGraph => RunState::Segmented,
            Stage::Relabel => RunState::GraphBuilt,
            Stage::Write => RunState::Relabeled,
        }
    }

    /// Checkpoint artifact holding this stage's output, if it keeps one
    pub fn artifact_file(self) -> Option<&'static str> {
        match self {
            Stage::Load => Some("volume.bin"),
            Stage::Segment => Some("labels.bin"),
            Stage::BuildGraph => Some("graph.bin"),
            Stage::Relabel => Some("relabeled.bin"),
            Stage::Write => None,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Loaded,
    Segmented,
    GraphBuilt,
    Relabeled,
    Written,
    Done,
    Failed {
        stage: Stage,
        kind: FailureKind,
        reason: String,
    },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }

    /// Stage to run from here; `None` at `Written` and in terminal states
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            RunState::Pending => Some(Stage::Load),
            RunState::Loaded => Some(Stage::Segment),
            RunState::Segmented => Some(Stage::BuildGraph),
            RunState::GraphBuilt => Some(Stage::Relabel),
            RunState::Relabeled => Some(Stage::Write),
            RunState::Written | RunState::Done | RunState::Failed { .. } => None,
        }
    }

    /// Most recent stage whose output is checkpointed
    pub fn last_completed(&self) -> Option<Stage> {
        match self {
            RunState::Pending => None,
            RunState::Loaded => Some(Stage::Load),
            RunState::Segmented => Some(Stage::Segment),
            RunState::GraphBuilt => Some(Stage::BuildGraph),
            RunState::Relabeled => Some(Stage::Relabel),
            RunState::Written | RunState::Done => Some(Stage::Write),
            RunState::Failed { stage, .. } => {
                let index = Stage::ALL.iter().position(|s| s == stage)?;
                index.checked_sub(1).map(|i| Stage::ALL[i])
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Loaded => "loaded",
            RunState::Segmented => "segmented",
            RunState::GraphBuilt => "graph_built",
            RunState::Relabeled => "relabeled",
            RunState::Written => "written",
            RunState::Done => "done",
            RunState::Failed { .. } => "failed",
        }
    }

    /// Move to `next`, rejecting anything but one step forward, `Written →
    /// Done`, or failing out of a non-terminal state.
    pub fn transition(&self, next: RunState) -> ReconResult<RunState> {
        let legal = match (self, &next) {
            (current, RunState::Failed { .. }) => !current.is_terminal(),
            (RunState::Written, RunState::Done) => true,
            (current, next) => current
                .next_stage()
                .map(|stage| stage.completed_state() == *next)
                .unwrap_or(false),
        };
        if legal {
            Ok(next)
        } else {
            Err(ReconError::Internal(format!(
                "illegal state transition {} -> {}",
                self.name(),
                next.name()
            )))
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Failed {
                stage,
                kind,
                reason,
            } => write!(f, "failed at {} ({}): {}", stage, kind, reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stage: Stage) -> RunState {
        RunState::Failed {
            stage,
            kind: FailureKind::TransientIo,
            reason: "disk".to_string(),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut state = RunState::Pending;
        for stage in Stage::ALL {
            assert_eq!(state.next_stage(), Some(stage));
            state = state.transition(stage.completed_state()).unwrap();
        }
        assert_eq!(state, RunState::Written);
        assert_eq!(state.next_stage(), None);
        state = state.transition(RunState::Done).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(RunState::Pending.transition(RunState::Segmented).is_err());
        assert!(RunState::Loaded.transition(RunState::Loaded).is_err());
        assert!(RunState::Relabeled.transition(RunState::Done).is_err());
        assert!(RunState::Done.transition(failed(Stage::Write)).is_err());
        assert!(failed(Stage::Load).transition(RunState::Loaded).is_err());
        assert!(failed(Stage::Load).transition(failed(Stage::Load)).is_err());
    }

    #[test]
    fn test_failure_from_any_running_state() {
        for stage in Stage::ALL {
            assert!(stage.starting_state().transition(failed(stage)).is_ok());
        }
        assert!(RunState::Written.transition(failed(Stage::Write)).is_ok());
    }

    #[test]
    fn test_last_completed() {
        assert_eq!(RunState::Pending.last_completed(), None);
        assert_eq!(RunState::GraphBuilt.last_completed(), Some(Stage::BuildGraph));
        assert_eq!(failed(Stage::Load).last_completed(), None);
        assert_eq!(failed(Stage::Relabel).last_completed(), Some(Stage::BuildGraph));
        for stage in Stage::ALL {
            assert_eq!(stage.starting_state().next_stage(), Some(stage));
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(failed(Stage::BuildGraph)).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["stage"], "build_graph");
        assert_eq!(json["kind"], "transient_io");
        let back: RunState = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed(Stage::BuildGraph));
    }
}
