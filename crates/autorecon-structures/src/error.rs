// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every reconstruction stage.
//!
//! The variants map one-to-one onto how the orchestrator reacts to them, see
//! [`FailureKind`]. Stage code never swallows an error into a partial result:
//! it returns one of these and the specimen's run records it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::io;

/// Result type for reconstruction operations
pub type ReconResult<T> = Result<T, ReconError>;

/// Errors that can occur while reconstructing a specimen
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Disk or network hiccup; retried with backoff by the orchestrator
    #[error("Transient I/O failure while {context}: {source}")]
    TransientIo {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Corrupt volume, bad metadata, classifier shape mismatch, bad SWC row
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// No soma, or a graph that is not a single rooted tree
    #[error("Topology violation: {0}")]
    TopologyViolation(String),

    /// Out of memory / accelerator capacity during inference
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Timed out after {after_ms} ms while {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Checkpoint or artifact codec failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error indicating a bug
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconError {
    /// Classify an I/O error.
    ///
    /// Missing files, unreadable data and permission problems will not fix
    /// themselves on retry and are reported as malformed input. Everything
    /// else (interrupted reads, timeouts, broken pipes on network mounts) is
    /// transient.
    pub fn from_io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        match source.kind() {
            io::ErrorKind::NotFound
            | io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::UnexpectedEof => {
                ReconError::MalformedInput(format!("{}: {}", context, source))
            }
            _ => ReconError::TransientIo { context, source },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ReconError::TransientIo { .. } => FailureKind::TransientIo,
            ReconError::MalformedInput(_) | ReconError::Serialization(_) => {
                FailureKind::MalformedInput
            }
            ReconError::TopologyViolation(_) => FailureKind::TopologyViolation,
            ReconError::ResourceExhausted(_) => FailureKind::ResourceExhaustion,
            ReconError::Timeout { .. } => FailureKind::Timeout,
            ReconError::Cancelled(_) => FailureKind::Cancelled,
            ReconError::Internal(_) => FailureKind::Internal,
        }
    }

    /// True if the operation may succeed when simply repeated
    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::TransientIo
    }
}

/// Coarse failure category recorded in checkpoints and batch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientIo,
    MalformedInput,
    TopologyViolation,
    ResourceExhaustion,
    Timeout,
    Cancelled,
    Internal,
}

impl FailureKind {
    /// Specimens failing with these kinds need a human to look at them
    pub fn needs_manual_review(&self) -> bool {
        matches!(self, FailureKind::TopologyViolation)
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::TransientIo => "transient_io",
            FailureKind::MalformedInput => "malformed_input",
            FailureKind::TopologyViolation => "topology_violation",
            FailureKind::ResourceExhaustion => "resource_exhaustion",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let missing = ReconError::from_io("reading slice", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(missing.kind(), FailureKind::MalformedInput);
        assert!(!missing.is_transient());

        let hiccup = ReconError::from_io("reading slice", io::Error::from(io::ErrorKind::Interrupted));
        assert_eq!(hiccup.kind(), FailureKind::TransientIo);
        assert!(hiccup.is_transient());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::TopologyViolation).unwrap();
        assert_eq!(json, "\"topology_violation\"");
        assert!(FailureKind::TopologyViolation.needs_manual_review());
        assert!(!FailureKind::Timeout.needs_manual_review());
    }
}
