//! Bounded retry for message store appends.
//!
//! A send must never broadcast a message the store did not accept, so a
//! failed append is retried a fixed number of times with doubling backoff
//! before the failure is reported to the sender. Only transient failures
//! are retried; a rejected query fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use murmur_types::config::RelayConfig;
use murmur_types::error::RepositoryError;
use tracing::warn;

/// Retry policy for store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_delay: Duration,
}

impl StoreRetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.store_retry_attempts,
            Duration::from_millis(config.store_retry_backoff_ms),
        )
    }

    /// Whether another attempt is allowed after `attempt` failed.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt `attempt` before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempts are
    /// exhausted.
    ///
    /// Returns the last error when no attempt succeeds.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && self.should_retry(attempt) => {
                    let delay = self.delay_after(attempt);
                    warn!(attempt, ?delay, error = %err, "store operation failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}
