// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use autorecon_structures::{ReconError, ReconResult, StagedFile};
use crossbeam::channel::{bounded, RecvTimeoutError};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Run `operation` on a helper thread and wait at most `timeout` for it.
///
/// On expiry the helper is abandoned and its eventual result dropped; the
/// caller gets `Timeout` right away. A panic on the helper is reported as
/// `Internal`.
pub fn run_with_timeout<T, F>(operation_name: &str, timeout: Duration, operation: F) -> ReconResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ReconResult<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    std::thread::Builder::new()
        .name(format!("autorecon-io-{}", operation_name))
        .spawn(move || {
            let _ = tx.send(operation());
        })
        .map_err(|e| ReconError::from_io(format!("spawning {} worker", operation_name), e))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                target: "autorecon-pipeline",
                "[TIMEOUT] {} exceeded {:?}",
                operation_name,
                timeout
            );
            Err(ReconError::Timeout {
                operation: operation_name.to_string(),
                after_ms: timeout.as_millis() as u64,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(ReconError::Internal(format!(
            "{} worker panicked",
            operation_name
        ))),
    }
}

/// [`run_with_timeout`] for file output. The helper only stages the file;
/// the rename onto the target happens on the calling thread once the helper
/// answered in time. A late helper's temp file is dropped and never renamed.
pub fn write_with_timeout<F>(operation_name: &str, timeout: Duration, stage: F) -> ReconResult<PathBuf>
where
    F: FnOnce() -> ReconResult<StagedFile> + Send + 'static,
{
    run_with_timeout(operation_name, timeout, stage)?.commit()
}
