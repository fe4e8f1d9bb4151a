//! Bounded retry with exponential backoff for provider calls.
//!
//! Embedding and generation calls are network round-trips. Each attempt runs
//! under a deadline; transient failures ([`RagError::is_retryable`]) are
//! retried up to [`RetryPolicy::max_attempts`] times before the caller's
//! fallback takes over.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// Attempt count, backoff, and per-attempt timeout for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff delay.
    pub max_backoff_ms: u64,
    /// Deadline for a single attempt.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 200, max_backoff_ms: 2_000, timeout_ms: 30_000 }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry(timeout_ms: u64) -> Self {
        Self { max_attempts: 1, initial_backoff_ms: 0, max_backoff_ms: 0, timeout_ms }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted.
///
/// Each attempt is bounded by [`RetryPolicy::timeout_ms`]; an elapsed
/// deadline counts as a retryable [`RagError::Timeout`].
///
/// # Errors
///
/// Returns the last error once no further attempt will be made.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout {
                operation: operation.to_string(),
                after_ms: policy.timeout_ms,
            }),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry_with_backoff`], but converts a final failure into a value
/// produced by `fallback`.
pub async fn retry_or_else<T, F, Fut, G>(
    policy: &RetryPolicy,
    operation: &str,
    call: F,
    fallback: G,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    G: FnOnce(RagError) -> T,
{
    match retry_with_backoff(policy, operation, call).await {
        Ok(value) => value,
        Err(e) => {
            warn!(operation, error = %e, "retries exhausted, using fallback");
            fallback(e)
        }
    }
}
