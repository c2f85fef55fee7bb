//! Bounded exponential-backoff retry for transient failures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;

/// Retry policy applied around auth recovery.
///
/// Only [transient](Error::is_transient) errors are retried. Cancellation
/// is observed both while a call is in flight and during the backoff
/// sleep, and always surfaces as [`Error::Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the next attempt after `attempt` (1-based) failed:
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires. `op` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(Error::Aborted);
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Aborted),
                r = op(attempt) => r,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if err.is_aborted() || !err.is_transient() {
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %err, "retries exhausted");
                return Err(Error::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt);
            debug!(
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure; backing off"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Aborted),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
