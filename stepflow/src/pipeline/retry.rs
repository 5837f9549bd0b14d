//! Per-step retry policy.
//!
//! Retries are immediate unless a backoff is configured. The policy only
//! re-runs the action: condition and transform are evaluated once, before
//! the first attempt.

use super::{BackoffStrategy, PipelineOptions};
use crate::errors::StepError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry settings derived from [`PipelineOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    /// Delay policy between attempts.
    pub backoff: BackoffStrategy,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Randomize delays between zero and their computed value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::Immediate,
            base_delay_ms: 0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Builds the policy for a pipeline's options.
    #[must_use]
    pub fn from_options(options: &PipelineOptions) -> Self {
        Self {
            max_attempts: options.max_retries.max(1),
            backoff: options.retry_backoff,
            base_delay_ms: options.retry_delay_ms,
            jitter: options.retry_jitter,
        }
    }

    /// Returns the delay before attempt `attempt + 1`, given that `attempt`
    /// (1-based) just failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let delay = match self.backoff {
            BackoffStrategy::Immediate => 0,
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            }
        };

        let delay = if self.jitter && delay > 0 {
            rand::thread_rng().gen_range(0..=delay)
        } else {
            delay
        };

        Duration::from_millis(delay)
    }

    /// Runs `attempt_fn` until it succeeds or attempts are exhausted.
    ///
    /// `attempt_fn` receives the 1-based attempt number. `on_retry` is called
    /// with the failed attempt number and its error before each retry.
    pub async fn run<T, F, Fut, R>(&self, mut attempt_fn: F, mut on_retry: R) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
        R: FnMut(u32, &StepError),
    {
        let mut attempt = 1;
        loop {
            match attempt_fn(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) if attempt < self.max_attempts => {
                    on_retry(attempt, &err);
                    let delay = self.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

/// Final outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Result of the last attempt.
    pub result: Result<T, StepError>,
    /// Number of attempts made.
    pub attempts: u32,
}
