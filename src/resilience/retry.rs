//! Retry executor with exponential backoff.

use super::{calculate_backoff, RetryConfig};
use crate::errors::{ApaasError, ApaasResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs an operation until it succeeds, fails terminally or runs out of attempts.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Creates a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes `operation` up to `max_retries + 1` times.
    ///
    /// Errors for which [`ApaasError::is_retryable`] is false are returned at
    /// once. When attempts run out the last error is returned unchanged. If
    /// `cancel` fires during a backoff wait, [`ApaasError::Cancelled`] is
    /// returned and the pending retry is dropped.
    pub async fn run<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> ApaasResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApaasResult<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ApaasError::Cancelled);
            }

            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= self.config.max_retries {
                warn!(
                    attempts = attempt + 1,
                    error = %error,
                    "retries exhausted"
                );
                return Err(error);
            }

            let delay = calculate_backoff(attempt, &self.config);
            debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApaasError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
