//! Exponential-backoff retry policy
//!
//! A [`RetryPolicy`] wraps any fallible async operation. It retries only errors whose
//! [`ErrorKind`] is in the policy's declared set, waits
//! `clamp(multiplier × 2^(attempt−1), min_wait, max_wait)` between attempts, and hands
//! back the last error unchanged once attempts are exhausted.
//!
//! Two instances are used by the pipeline:
//! - `fetch`: retries `fetch` and `timeout` errors, waiting 1 s to 10 s
//! - `generation`: retries `generation` and `timeout` errors, waiting 2 s to 30 s

use crate::config::{BackoffConfig, RetryConfig};
use crate::{Classify, ErrorKind};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Reusable retry wrapper
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: &'static str,
    max_attempts: u32,
    multiplier: Duration,
    min_wait: Duration,
    max_wait: Duration,
    retry_on: Vec<ErrorKind>,
}

impl RetryPolicy {
    /// Creates a policy with a one-second multiplier
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in log lines
    /// * `max_attempts` - Total attempts including the first (values below 1 act as 1)
    /// * `min_wait` / `max_wait` - Bounds applied to every computed wait
    /// * `retry_on` - Error kinds that are worth another attempt
    pub fn new(
        name: &'static str,
        max_attempts: u32,
        min_wait: Duration,
        max_wait: Duration,
        retry_on: Vec<ErrorKind>,
    ) -> Self {
        Self {
            name,
            max_attempts: max_attempts.max(1),
            multiplier: Duration::from_secs(1),
            min_wait,
            max_wait,
            retry_on,
        }
    }

    /// Policy applied to page fetches
    pub fn fetch(max_attempts: u32) -> Self {
        Self::with_backoff("fetch", max_attempts, &BackoffConfig::fetch(), Self::fetch_kinds())
    }

    /// Policy applied to structured-generation calls
    pub fn generation(max_attempts: u32) -> Self {
        Self::with_backoff(
            "generation",
            max_attempts,
            &BackoffConfig::generation(),
            Self::generation_kinds(),
        )
    }

    /// Builds the (fetch, generation) pair from the `[retry]` section
    pub fn from_config(config: &RetryConfig) -> (Self, Self) {
        (
            Self::with_backoff("fetch", config.max_attempts, &config.fetch, Self::fetch_kinds()),
            Self::with_backoff(
                "generation",
                config.max_attempts,
                &config.generation,
                Self::generation_kinds(),
            ),
        )
    }

    fn with_backoff(
        name: &'static str,
        max_attempts: u32,
        backoff: &BackoffConfig,
        retry_on: Vec<ErrorKind>,
    ) -> Self {
        Self::new(
            name,
            max_attempts,
            Duration::from_millis(backoff.min_wait_ms),
            Duration::from_millis(backoff.max_wait_ms),
            retry_on,
        )
    }

    fn fetch_kinds() -> Vec<ErrorKind> {
        vec![ErrorKind::Fetch, ErrorKind::Timeout]
    }

    fn generation_kinds() -> Vec<ErrorKind> {
        vec![ErrorKind::Generation, ErrorKind::Timeout]
    }

    /// Overrides the exponential multiplier
    pub fn with_multiplier(mut self, multiplier: Duration) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether an error of this kind is retried
    pub fn retries(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Wait before the attempt that follows attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable kind, or the
    /// attempt budget is spent
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The first successful result
    /// * `Err(E)` - The last error produced, unchanged
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Classify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            "{} operation succeeded on attempt {}/{}",
                            self.name,
                            attempt,
                            self.max_attempts
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.kind();

                    if !self.retries(kind) {
                        tracing::debug!(
                            "{} operation failed with non-retryable {} error: {}",
                            self.name,
                            kind,
                            err
                        );
                        return Err(err);
                    }

                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            "{} operation gave up after {} attempts: {}",
                            self.name,
                            attempt,
                            err
                        );
                        return Err(err);
                    }

                    let wait = self.backoff(attempt);
                    tracing::debug!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        self.name,
                        attempt,
                        self.max_attempts,
                        err,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
