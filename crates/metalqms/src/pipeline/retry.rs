//! Bounded retries with exponential backoff for processing steps.

use std::time::Duration;

use thiserror::Error;

use crate::clock::Sleeper;
use crate::config::schema::RetryPolicyConfig;
use crate::error::{ExtractionError, IndexingError, PreviewError};

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        ExtractionError::is_retryable(self)
    }
}

impl Retryable for PreviewError {
    fn is_retryable(&self) -> bool {
        PreviewError::is_retryable(self)
    }
}

impl Retryable for IndexingError {
    fn is_retryable(&self) -> bool {
        IndexingError::is_retryable(self)
    }
}

/// The last error of a retried operation and how many attempts were made.
#[derive(Error, Debug)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryError<E: std::error::Error + 'static> {
    #[source]
    pub error: E,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryPolicyConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.base_delay_secs),
            Duration::from_secs(config.max_delay_secs),
        )
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Wait after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached. `op` receives the 1-based attempt number.
    pub fn execute<T, E, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::error::Error + 'static,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(error) => return Err(RetryError { error, attempts: attempt }),
            }
        }
    }
}
