//! Rate limiter implementation using token bucket algorithm.

use crate::errors::{ApaasError, ApaasResult};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Configuration for request throttling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Requests allowed per interval.
    pub requests_per_interval: u32,
    /// Length of the interval.
    pub interval: Duration,
    /// Bucket capacity, i.e. how many requests may go out back to back.
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_interval: 5,
            interval: Duration::from_secs(1),
            burst: 20,
        }
    }
}

impl LimiterConfig {
    /// Replaces zero values with the defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            requests_per_interval: if self.requests_per_interval == 0 {
                defaults.requests_per_interval
            } else {
                self.requests_per_interval
            },
            interval: if self.interval.is_zero() {
                defaults.interval
            } else {
                self.interval
            },
            burst: if self.burst == 0 {
                defaults.burst
            } else {
                self.burst
            },
        }
    }

    /// Refill rate in tokens per second.
    pub fn refill_per_second(&self) -> f64 {
        f64::from(self.requests_per_interval) / self.interval.as_secs_f64()
    }
}

/// Token bucket for rate limiting.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let needed = 1.0 - self.tokens;
        Duration::from_secs_f64(needed / self.refill_rate).max(Duration::from_millis(1))
    }
}

/// Token-bucket gate in front of every outbound call.
///
/// A disabled limiter lets every call through immediately.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// Creates a new rate limiter; the bucket starts full.
    pub fn new(config: LimiterConfig) -> Self {
        let config = config.normalized();
        Self {
            bucket: Some(Mutex::new(TokenBucket::new(
                f64::from(config.burst),
                config.refill_per_second(),
            ))),
        }
    }

    /// Creates a limiter that never throttles.
    pub fn disabled() -> Self {
        Self { bucket: None }
    }

    /// Creates a limiter from an optional configuration, `None` meaning disabled.
    pub fn from_config(config: Option<LimiterConfig>) -> Self {
        config.map_or_else(Self::disabled, Self::new)
    }

    /// Returns true if the limiter throttles calls.
    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Waits for a slot, or returns [`ApaasError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> ApaasResult<()> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };

        loop {
            if cancel.is_cancelled() {
                return Err(ApaasError::Cancelled);
            }

            let wait = {
                let mut bucket = bucket.lock().await;
                bucket.refill();
                if bucket.try_consume() {
                    return Ok(());
                }
                bucket.time_until_available()
            };

            trace!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting for refill");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApaasError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Takes a slot if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        match &self.bucket {
            None => true,
            Some(bucket) => {
                let mut bucket = bucket.lock().await;
                bucket.refill();
                bucket.try_consume()
            }
        }
    }

    /// Number of whole slots currently available, `None` when disabled.
    pub async fn available(&self) -> Option<u32> {
        let bucket = self.bucket.as_ref()?;
        let mut bucket = bucket.lock().await;
        bucket.refill();
        Some(bucket.tokens.floor() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: u32, burst: u32) -> LimiterConfig {
        LimiterConfig {
            requests_per_interval: rate,
            interval: Duration::from_secs(1),
            burst,
        }
    }

    #[test]
    fn test_limiter_config_default() {
        let config = LimiterConfig::default();
        assert_eq!(config.requests_per_interval, 5);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.burst, 20);
        assert_eq!(config.refill_per_second(), 5.0);
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let config = LimiterConfig {
            requests_per_interval: 0,
            interval: Duration::ZERO,
            burst: 0,
        }
        .normalized();
        assert_eq!(config, LimiterConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(config(5, 2));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire(&cancel).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(250), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(config(5, 3));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(limiter.available().await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_cancelled_while_waiting() {
        let limiter = RateLimiter::new(config(1, 1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(ApaasError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_disabled_limiter_is_noop() {
        let limiter = RateLimiter::from_config(None);
        let cancel = CancellationToken::new();
        assert!(!limiter.is_enabled());
        for _ in 0..1000 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert!(limiter.try_acquire().await);
        assert_eq!(limiter.available().await, None);
    }

    #[tokio::test]
    async fn test_try_acquire_drains_bucket() {
        let limiter = RateLimiter::new(config(1, 2));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }
}
