//! Bounded exponential backoff for busy controllers.
//!
//! Only [`DeviceBusy`](crate::core::Error::DeviceBusy) is retried. Discovery never uses this.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::core::{
    BUSY_RETRY_ATTEMPTS, BUSY_RETRY_INITIAL_BACKOFF, BUSY_RETRY_MAX_BACKOFF, BUSY_RETRY_MULTIPLIER,
    Result,
};

/// Retry schedule for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Backoff growth factor.
    pub multiplier: u32,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: BUSY_RETRY_ATTEMPTS,
            initial_backoff: BUSY_RETRY_INITIAL_BACKOFF,
            multiplier: BUSY_RETRY_MULTIPLIER,
            max_backoff: BUSY_RETRY_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Run `operation`, retrying while it fails with
    /// [`DeviceBusy`](crate::core::Error::DeviceBusy).
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(attempt, ?delay, "controller busy, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Run `operation` under `policy`, or once when there is no policy.
pub async fn with_optional_retry<T, F, Fut>(policy: Option<RetryPolicy>, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match policy {
        Some(policy) => policy.run(operation).await,
        None => operation().await,
    }
}
