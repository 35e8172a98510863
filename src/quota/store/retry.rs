//! Retry Logic for Remote Stores
//!
//! Exponential backoff with jitter around usage store calls. Only errors the
//! store marks as transient are retried; rejected requests fail at once.
//!
//! # Example
//!
//! ```ignore
//! use modelquota::quota::store::retry::{RetryConfig, retry_with_backoff};
//!
//! let config = RetryConfig::default()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100));
//!
//! let record = retry_with_backoff(&config, || store.fetch(owner, name)).await?;
//! ```

use std::time::Duration;
use tokio::time::sleep;

use crate::error::{QuotaError, Result};

/// Retry configuration
///
/// # Fields
///
/// * `max_attempts` - Attempts including the first one (default: 3)
/// * `base_delay` - Delay before the first retry (default: 100ms)
/// * `max_delay` - Upper bound for any delay (default: 5s)
/// * `jitter` - Random delay variation factor (default: 0.1 = 10%)
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt count; values below one are raised to one
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter factor, clamped to 0.0..=1.0
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (zero based)
    ///
    /// `base_delay * 2^attempt`, plus jitter, capped at `max_delay`.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(31) as u32);
        let exponential_delay = self.base_delay.saturating_mul(factor);

        let jitter_range = exponential_delay.mul_f64(self.jitter);
        let jitter_offset = rand::random::<f64>() * jitter_range.as_secs_f64();
        let jittered_delay =
            exponential_delay.saturating_add(Duration::from_secs_f64(jitter_offset));

        jittered_delay.min(self.max_delay)
    }

    /// Whether `error` is worth another attempt
    pub fn should_retry_error(&self, error: &QuotaError) -> bool {
        error.is_retryable()
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// Returns the last error when every attempt failed.
pub async fn retry_with_backoff<F, T, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempt = attempt + 1, "store call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt + 1 < max_attempts && config.should_retry_error(&e) => {
                let delay = config.calculate_delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "store call failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Whether an HTTP status from the store is transient
///
/// 408, 429 and 5xx (except 501 and 505) are retried.
pub fn should_retry_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        500..=599 => status != 501 && status != 505,
        _ => false,
    }
}
