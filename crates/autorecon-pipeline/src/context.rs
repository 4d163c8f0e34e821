// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Batch-wide context handed explicitly to every specimen worker.

use autorecon_config::AutoreconConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Batch progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Progress {
    pub fn finished(&self) -> usize {
        self.done + self.failed + self.cancelled
    }
}

/// How one specimen ended, for the progress counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed,
    Cancelled,
}

/// Configuration, cancellation flag and progress shared by one batch.
/// Cloning shares the same flag and counters.
#[derive(Debug, Clone)]
pub struct RunContext {
    config: Arc<AutoreconConfig>,
    cancel: Arc<AtomicBool>,
    progress: Arc<Mutex<Progress>>,
}

impl RunContext {
    pub fn new(config: AutoreconConfig) -> Self {
        Self {
            config: Arc::new(config),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(Mutex::new(Progress::default())),
        }
    }

    pub fn config(&self) -> &AutoreconConfig {
        &self.config
    }

    /// Stop scheduling new specimens and stages. In-flight stage output is
    /// discarded; completed checkpoints stay.
    pub fn cancel(&self) {
        if !self.cancel.swap(true, Ordering::SeqCst) {
            info!(target: "autorecon-pipeline", "[BATCH] cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The raw flag, for stages that poll it themselves
    pub fn cancel_flag(&self) -> &Arc<AtomicBool> {
        &self.cancel
    }

    pub fn progress(&self) -> Progress {
        *self.progress.lock()
    }

    pub(crate) fn begin_batch(&self, total: usize) {
        *self.progress.lock() = Progress {
            total,
            ..Progress::default()
        };
    }

    pub(crate) fn specimen_started(&self) {
        self.progress.lock().in_flight += 1;
    }

    pub(crate) fn specimen_finished(&self, outcome: Outcome) -> Progress {
        let mut progress = self.progress.lock();
        progress.in_flight = progress.in_flight.saturating_sub(1);
        match outcome {
            Outcome::Done => progress.done += 1,
            Outcome::Failed => progress.failed += 1,
            Outcome::Cancelled => progress.cancelled += 1,
        }
        *progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag_and_counters() {
        let context = RunContext::new(AutoreconConfig::default());
        let worker = context.clone();
        context.begin_batch(3);

        worker.specimen_started();
        worker.specimen_finished(Outcome::Done);
        worker.specimen_started();
        assert_eq!(context.progress().in_flight, 1);
        let progress = worker.specimen_finished(Outcome::Failed);
        assert_eq!(progress.finished(), 2);
        assert_eq!(context.progress().total, 3);

        assert!(!worker.is_cancelled());
        context.cancel();
        assert!(worker.is_cancelled());
        assert!(worker.cancel_flag().load(Ordering::SeqCst));
    }
}
