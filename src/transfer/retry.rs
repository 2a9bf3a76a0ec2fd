//! Retry with linear backoff for network mutations

use crate::error::{Result, SyncError};
use crate::logging::Logger;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The closure receives the 1-based attempt number. Errors that cannot
    /// be fixed by trying again end the loop early. Exhaustion yields
    /// [`SyncError::Transfer`] wrapping the last error.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        output: &Logger,
        mut attempt_fn: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
                result = attempt_fn(attempt) => result,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(error) => error,
            };

            if attempt >= self.max_attempts || !is_retryable(&error) {
                return Err(SyncError::Transfer {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.delay_for(attempt);
            output.warning(&format!(
                "{} failed (attempt {}/{}): {}; retrying in {}",
                operation,
                attempt,
                self.max_attempts,
                error,
                output.format_duration(delay)
            ));

            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

fn is_retryable(error: &SyncError) -> bool {
    !matches!(
        error,
        SyncError::Validation(_)
            | SyncError::UnsupportedPackageType(_)
            | SyncError::Descriptor(_)
            | SyncError::Config(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_error_after_exactly_n_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let result: Result<()> = policy()
            .run("upload", &CancellationToken::new(), &Logger::new_quiet(), |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(SyncError::Network(format!("boom {}", attempt))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(SyncError::Transfer { operation, attempts, source }) => {
                assert_eq!(operation, "upload");
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "Network error: boom 3");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // 5s after the first failure plus 10s after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let result = policy()
            .run("download", &CancellationToken::new(), &Logger::new_quiet(), |attempt| async move {
                if attempt < 3 {
                    Err(SyncError::Network("reset".to_string()))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = policy()
            .run("publish", &CancellationToken::new(), &Logger::new_quiet(), |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(SyncError::Descriptor("version mismatch".to_string())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(SyncError::Transfer { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result: Result<()> = policy()
            .run("upload", &cancel, &Logger::new_quiet(), |_| async {
                Err(SyncError::Network("down".to_string()))
            })
            .await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
