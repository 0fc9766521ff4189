//! Bounded fixed-delay retry.

use std::future::Future;
use std::time::Duration;

use theta_core::{Clock, ExecutionConfig};
use tracing::warn;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&ExecutionConfig> for RetryPolicy {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts are used up.
///
/// Sleeps `policy.delay` on `clock` between attempts. Exhaustion is reported
/// as [`EngineError::RetriesExhausted`] wrapping the last error.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= attempts => {
                return Err(EngineError::RetriesExhausted {
                    label: label.to_string(),
                    attempts,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    label,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Retrying"
                );
                clock.sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
