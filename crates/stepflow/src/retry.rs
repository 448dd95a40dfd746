//! Bounded exponential-backoff retry around single model calls.
//!
//! Only errors whose [`Error::is_retryable`] is true are retried:
//! transport failures, rate limits and timeouts. Validation and tool
//! errors fail immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::{Error, RetryReason};

/// Retry settings for model calls.
///
/// Delay before retry `n` (zero-based) is
/// `min(initial_delay * backoff_factor^n, max_delay) * random(1 - jitter, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between retries.
    pub backoff_factor: f64,
    /// Fraction of each delay that is randomized, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Rejects settings that would make the delay negative or undefined.
    pub fn validate(&self) -> Result<(), Error> {
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 || self.backoff_factor.is_infinite() {
            return Err(Error::invalid_argument(
                "backoff_factor",
                format!("must be a finite number of at least 1, got {}", self.backoff_factor),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::invalid_argument(
                "jitter",
                format!("must be between 0 and 1, got {}", self.jitter),
            ));
        }
        Ok(())
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or
    /// retries run out.
    ///
    /// With retries enabled, failures are wrapped in
    /// [`Error::RetryExhausted`]. With `max_retries == 0` the first error
    /// is returned as is. Cancelling `cancel` aborts the in-flight attempt
    /// or backoff sleep and returns [`Error::Cancelled`].
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut f: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(attempt, "model call cancelled");
                    return Err(Error::Cancelled);
                }
                outcome = f() => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if self.max_retries == 0 {
                return Err(error);
            }
            if !error.is_retryable() {
                return Err(Error::RetryExhausted {
                    attempts: attempt + 1,
                    reason: RetryReason::ErrorNotRetryable,
                    last_error: Box::new(error),
                });
            }
            if attempt >= self.max_retries {
                return Err(Error::RetryExhausted {
                    attempts: attempt + 1,
                    reason: RetryReason::MaxRetriesExceeded,
                    last_error: Box::new(error),
                });
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying model call"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Computes the delay before retry `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_factor = if self.jitter > 0.0 {
            let min_factor = 1.0 - self.jitter.min(1.0);
            rand::rng().random_range(min_factor..=1.0)
        } else {
            1.0
        };

        Duration::try_from_secs_f64((capped * jitter_factor).max(0.0)).unwrap_or(self.max_delay)
    }
}
