// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded exponential backoff for transient I/O failures

use autorecon_config::RetryConfig;
use autorecon_structures::{ReconError, ReconResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Backoff schedule: `initial * multiplier^(n-1)`, capped at `max`
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    multiplier: f64,
    /// Total tries including the first one
    max_attempts: u32,
    current_attempt: u32,
}

impl BackoffPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            multiplier: config.backoff_multiplier,
            max_attempts: config.max_attempts.max(1),
            current_attempt: 0,
        }
    }

    /// Delay before the next retry, or `None` once attempts are used up
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt + 1 >= self.max_attempts {
            return None;
        }
        self.current_attempt += 1;
        let factor = self.multiplier.powi(self.current_attempt as i32 - 1);
        let backoff_ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Some(Duration::from_millis(backoff_ms as u64))
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn retries_used(&self) -> u32 {
        self.current_attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_attempt + 1 >= self.max_attempts
    }
}

/// Sleep in short slices so cancellation is noticed quickly
fn sleep_unless_cancelled(duration: Duration, cancel: &AtomicBool) -> bool {
    let slice = Duration::from_millis(25);
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
    !cancel.load(Ordering::SeqCst)
}

/// Run `operation`, retrying transient failures with backoff. Any other
/// error is returned immediately.
pub fn retry_with_backoff<F, T>(
    mut operation: F,
    policy: &mut BackoffPolicy,
    operation_name: &str,
    cancel: &AtomicBool,
) -> ReconResult<T>
where
    F: FnMut() -> ReconResult<T>,
{
    loop {
        match operation() {
            Ok(result) => {
                if policy.retries_used() > 0 {
                    info!(
                        target: "autorecon-pipeline",
                        "[RETRY] {} succeeded after {} retries",
                        operation_name,
                        policy.retries_used()
                    );
                }
                policy.reset();
                return Ok(result);
            }
            Err(e) if e.is_transient() => match policy.next_backoff() {
                Some(backoff) => {
                    warn!(
                        target: "autorecon-pipeline",
                        "[RETRY] {} failed (retry {}): {} - retrying in {:?}",
                        operation_name,
                        policy.retries_used(),
                        e,
                        backoff
                    );
                    if !sleep_unless_cancelled(backoff, cancel) {
                        return Err(ReconError::Cancelled(format!(
                            "{} interrupted during backoff",
                            operation_name
                        )));
                    }
                }
                None => {
                    warn!(
                        target: "autorecon-pipeline",
                        "[RETRY] {} failed after {} retries - giving up",
                        operation_name,
                        policy.retries_used()
                    );
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
            backoff_multiplier: 2.0,
        }
    }

    fn transient() -> ReconError {
        ReconError::TransientIo {
            context: "reading slice".to_string(),
            source: io::Error::new(io::ErrorKind::Interrupted, "nfs hiccup"),
        }
    }

    #[test]
    fn test_schedule_is_capped() {
        let mut policy = BackoffPolicy::new(&config(5));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_backoff(), None);
        assert!(policy.is_exhausted());
        policy.reset();
        assert_eq!(policy.retries_used(), 0);
    }

    #[test]
    fn test_transient_errors_retried_until_success() {
        let mut policy = BackoffPolicy::new(&RetryConfig {
            initial_backoff_ms: 1,
            ..config(4)
        });
        let mut calls = 0;
        let result = retry_with_backoff(
            || {
                calls += 1;
                if calls < 3 {
                    Err(transient())
                } else {
                    Ok(calls)
                }
            },
            &mut policy,
            "load",
            &AtomicBool::new(false),
        );
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut policy = BackoffPolicy::new(&RetryConfig {
            initial_backoff_ms: 1,
            ..config(3)
        });
        let mut calls = 0;
        let result: ReconResult<()> = retry_with_backoff(
            || {
                calls += 1;
                Err(transient())
            },
            &mut policy,
            "load",
            &AtomicBool::new(false),
        );
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_terminal_errors_not_retried() {
        let mut policy = BackoffPolicy::new(&config(5));
        let mut calls = 0;
        let result: ReconResult<()> = retry_with_backoff(
            || {
                calls += 1;
                Err(ReconError::MalformedInput("bad slice".into()))
            },
            &mut policy,
            "load",
            &AtomicBool::new(false),
        );
        assert!(matches!(result, Err(ReconError::MalformedInput(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_cancel_interrupts_backoff() {
        let mut policy = BackoffPolicy::new(&config(5));
        let result: ReconResult<()> =
            retry_with_backoff(|| Err(transient()), &mut policy, "load", &AtomicBool::new(true));
        assert!(matches!(result, Err(ReconError::Cancelled(_))));
    }
}
