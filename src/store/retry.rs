//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for a fallible async operation.
pub struct RetryPolicy<E> {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the doubling delay
    pub max_delay: Duration,
    /// Errors for which another attempt is worthwhile
    pub is_retryable: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl<E> RetryPolicy<E> {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure<E> {
    /// A non-retryable error ended the loop early
    Rejected { attempts: u32, error: E },
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryFailure<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Rejected { attempts, .. } | RetryFailure::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempt budget runs out. Sleeps `initial_delay`, doubling up to `max_delay`,
/// between attempts.
pub async fn with_retry<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy<E>,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        debug!(operation = label, attempt, max_attempts, "Attempting operation");
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !(policy.is_retryable)(&error) => {
                warn!(operation = label, attempt, error = %error, "Operation failed with non-retryable error");
                return Err(RetryFailure::Rejected {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) if attempt >= max_attempts => {
                warn!(operation = label, attempts = attempt, error = %error, "Operation failed, retries exhausted");
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
