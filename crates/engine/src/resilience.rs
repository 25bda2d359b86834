//! Resilient remote-call execution.
//!
//! Wraps any remote call with a per-attempt timeout, bounded retries, and
//! exponential backoff with jitter. Pure infrastructure: the executor knows
//! nothing about carts, only about [`EngineError`] classification. Terminal
//! errors short-circuit the retry loop; retryable errors consume the attempt
//! budget before surfacing.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Retry and backoff policy for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first attempt. Must be >= 1.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per retry.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the `attempt`-th failure (1-based), before
    /// jitter: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let exp_ms = base_ms.saturating_mul(1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX));
        Duration::from_millis(exp_ms).min(self.max_delay)
    }

    /// `delay_for_attempt` plus up to 25% random jitter, so synchronized
    /// clients don't retry in lockstep against a struggling backend.
    #[must_use]
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let cap = u64::try_from(delay.as_millis() / 4).unwrap_or(0);
        let jitter = if cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=cap)
        };
        delay + Duration::from_millis(jitter)
    }
}

/// Executes remote calls under a retry/backoff/timeout policy.
#[derive(Debug, Clone)]
pub struct ResilientCallExecutor {
    policy: RetryPolicy,
}

impl ResilientCallExecutor {
    /// Create an executor with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `call`, retrying retryable failures up to the attempt budget.
    ///
    /// Each attempt is independently bounded by `timeout`; an elapsed
    /// timeout counts as one retryable network failure, not as a hang.
    ///
    /// # Errors
    ///
    /// Returns the first terminal error, or the last retryable error once
    /// the attempt budget is exhausted.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        call: F,
    ) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Network(format!(
                    "{operation} timed out after {}ms",
                    timeout.as_millis()
                ))),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    debug!(operation, attempt, error = %error, "terminal failure, not retrying");
                    return Err(error);
                }
                Err(error) if attempt >= self.policy.max_attempts => {
                    warn!(operation, attempt, error = %error, "retry budget exhausted");
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.policy.jittered_delay_for_attempt(attempt);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1600));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=4 {
            let base = policy.delay_for_attempt(attempt);
            for _ in 0..20 {
                let jittered = policy.jittered_delay_for_attempt(attempt);
                assert!(jittered >= base);
                assert!(jittered <= base + base / 4 + Duration::from_millis(1));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let executor = ResilientCallExecutor::new(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = executor
            .execute("op", TIMEOUT, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_consumes_attempt_budget() {
        let executor = ResilientCallExecutor::new(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), EngineError> = executor
            .execute("op", TIMEOUT, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::Network("connection reset".into()))
                }
            })
            .await;

        assert_eq!(result, Err(EngineError::Network("connection reset".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_short_circuits() {
        let executor = ResilientCallExecutor::new(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), EngineError> = executor
            .execute("op", TIMEOUT, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::Auth("session expired".into()))
                }
            })
            .await;

        assert_eq!(result, Err(EngineError::Auth("session expired".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let executor = ResilientCallExecutor::new(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = executor
            .execute("op", TIMEOUT, || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(EngineError::Server("HTTP 503".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_retryable_failure() {
        let executor = ResilientCallExecutor::new(RetryPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), EngineError> = executor
            .execute("op", Duration::from_millis(100), || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<Result<(), EngineError>>().await
                }
            })
            .await;

        // Every attempt timed out; all three were made, none hung.
        assert!(matches!(result, Err(EngineError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
