//! Exponential backoff for control-plane calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::ControlResult;

/// Backoff schedule and total wait budget for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Total time spent retrying before the last transient error is surfaced.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self { max_elapsed: Duration::ZERO, ..Self::default() }
    }

    /// Calculate the delay for a given retry attempt.
    ///
    /// Uses exponential backoff: initial_delay * multiplier^retry_count, capped at max_delay.
    #[must_use]
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let delay_ms = (self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Whether an HTTP status code marks a retryable response.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || matches!(status, 408 | 409 | 429)
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the policy's wait budget is spent.
///
/// The last transient error is returned once the next sleep would overrun
/// `max_elapsed`.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> ControlResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlResult<T>>,
{
    let started = Instant::now();
    let mut retry_count = 0u32;

    loop {
        match call().await {
            Err(e) if e.is_transient() => {
                let delay = policy.calculate_delay(retry_count);
                if started.elapsed() + delay > policy.max_elapsed {
                    warn!(operation, attempts = retry_count + 1, error = %e, "Retry budget exhausted");
                    return Err(e);
                }
                debug!(
                    operation,
                    attempt = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient control-plane error, retrying"
                );
                sleep(delay).await;
                retry_count += 1;
            }
            other => return other,
        }
    }
}
