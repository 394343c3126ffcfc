//! Retry and timeout handling for outbound calls.
//!
//! Every call to an external service (LLM, embeddings, course store, review
//! index) goes through [`with_retry`], which bounds each attempt with a
//! timeout and retries transient failures with exponential backoff.

use crate::error::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff before the second attempt, in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default per-attempt timeout, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Retry behaviour for a single outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (minimum 1)
    pub max_attempts: u32,

    /// Sleep before the second attempt; doubled for each further attempt
    pub initial_backoff: Duration,

    /// Upper bound for a single attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            call_timeout,
        }
    }

    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Run `operation` under `policy`.
///
/// Each attempt is wrapped in `tokio::time::timeout`; an elapsed attempt
/// counts as `AppError::Timeout`. Errors for which
/// [`AppError::is_transient`] is false are returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} did not complete within {:?}",
                name, policy.call_timeout
            ))),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("{} succeeded on attempt {}", name, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff_after(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    name,
                    attempt,
                    max_attempts,
                    e,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast_policy(3), "flaky", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AppError::Llm("unavailable".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_retry(&fast_policy(2), "down", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Store("connection refused".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Store(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<()> = with_retry(&fast_policy(5), "bad-config", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Config("missing key".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            call_timeout: Duration::from_millis(10),
        };
        let result: AppResult<()> = with_retry(&policy, "slow", || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(400));
    }
}
