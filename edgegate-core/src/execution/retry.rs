//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::classify::{classify, FailureKind};
use super::venue::VenueError;
use crate::config::ExecutionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Timeout for each individual attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            base_delay: settings.retry_base_delay(),
            max_delay: settings.retry_max_delay(),
            attempt_timeout: settings.request_timeout(),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base × 2^(attempt-1), capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// The operation gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    pub kind: FailureKind,
    pub attempts: u32,
    pub last_error: VenueError,
}

/// Run `op` until it succeeds, fails with a non-retryable kind, or the attempt
/// budget is spent. Returns the value and the number of attempts used.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, VenueError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(r) => r,
            Err(_) => Err(VenueError::Timeout(policy.attempt_timeout)),
        };
        let err = match outcome {
            Ok(v) => return Ok((v, attempt)),
            Err(e) => e,
        };

        let kind = classify(&err);
        if !kind.is_retryable() || attempt >= policy.max_attempts {
            warn!(op = op_name, attempt, %kind, error = %err, "giving up");
            return Err(RetryFailure {
                kind,
                attempts: attempt,
                last_error: err,
            });
        }

        let delay = policy.delay_after(attempt);
        debug!(op = op_name, attempt, %kind, delay_ms = delay.as_millis() as u64, "retrying");
        tokio::time::sleep(delay).await;
    }
}
