// Bounded retry with exponential backoff, restricted to transient failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{Collection, with_deadline};
use crate::error::Result;
use crate::models::FindOptions;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Time budget per attempt; exceeding it counts as a transient failure.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before `attempt` (1-based): zero for the first, then base * 2^(attempt-1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or attempts run out.
/// The last observed error is returned.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 1;
    loop {
        match with_deadline(policy.attempt_timeout, op()).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Find against `collection`, retrying transient failures per `policy`. Reads are idempotent.
/// `options.max_time` bounds each attempt; an attempt that runs past it is retried as a timeout.
pub async fn find_with_retry<C: Collection>(
    collection: &C,
    filter: &C::Filter,
    options: &FindOptions,
    policy: &RetryPolicy,
) -> Result<Vec<C::Record>> {
    retry_transient(policy, "find", || {
        with_deadline(options.max_time, collection.find(filter, options))
    })
    .await
}
