//! Resilience patterns for aPaaS API calls.
//!
//! This module provides exponential backoff with jitter, a cancellable retry
//! executor and a token-bucket rate limiter shared by every call of a client.

mod rate_limiter;
mod retry;

pub use rate_limiter::{LimiterConfig, RateLimiter};
pub use retry::RetryExecutor;

use rand::Rng;
use std::time::Duration;

/// Fraction of the capped delay that jitter may add on top of it.
pub const JITTER_FACTOR: f64 = 0.25;

/// Retry configuration for exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound applied to the exponential delay before jitter.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to add jitter to backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Checks the invariants of the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("retry initial delay must be greater than zero".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("retry max delay must not be shorter than the initial delay".to_string());
        }
        if !(self.multiplier >= 1.0) || !self.multiplier.is_finite() {
            return Err("retry multiplier must be a finite number >= 1".to_string());
        }
        Ok(())
    }
}

/// Calculates the backoff delay that follows the failed attempt `attempt` (0-based).
///
/// The exponential value is capped at `max_delay` first; jitter is then added on
/// top, so a jittered delay may exceed `max_delay` by up to a quarter.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config.initial_delay.as_nanos() as f64;
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let mut delay = base * config.multiplier.powi(exponent);

    let max = config.max_delay.as_nanos() as f64;
    if !delay.is_finite() || delay > max {
        delay = max;
    }

    if config.jitter && delay > 0.0 {
        let jitter = rand::thread_rng().gen_range(0.0..=delay * JITTER_FACTOR);
        delay += jitter;
    }

    Duration::from_nanos(delay.round() as u64)
}
