//! Bounded exponential backoff for transient store failures.
//!
//! Only errors whose code is retryable (rate limit, 5xx, network) are
//! retried. Everything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StoreResult;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Builder: set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates backoff delay based on consecutive failures.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self
            .backoff_multiplier
            .powi(consecutive_failures as i32 - 1);
        let delay = base * multiplier;
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut failures = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if failures > 0 {
                        debug!(operation, attempts = failures + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && failures + 1 < max_attempts => {
                    failures += 1;
                    let delay = match err.retry_after() {
                        Some(hint) => hint.max(self.backoff_delay(failures)).min(self.max_backoff),
                        None => self.backoff_delay(failures),
                    };
                    warn!(
                        operation,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_delay_doubles_and_caps() {
        let policy = RetryPolicy::default().with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(60),
            2.0,
        );
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("create", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(StoreError::rate_limited("slow down"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = RetryPolicy::default()
            .with_max_attempts(3)
            .run("query", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::server("bad gateway")) }
            })
            .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_stretches_the_wait() {
        let policy = RetryPolicy::default().with_max_attempts(2);
        for (hint, expected) in [(5, 5), (300, 30)] {
            let calls = AtomicU32::new(0);
            let started = tokio::time::Instant::now();
            policy
                .run("query", || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(StoreError::rate_limited("slow down")
                                .with_retry_after(Duration::from_secs(hint)))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await
                .unwrap();
            assert_eq!(started.elapsed().as_secs(), expected);
        }
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> = RetryPolicy::default()
            .run("update", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::bad_request("unknown property")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
