//! Capped exponential backoff for individual remote requests.

use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

use crate::config::RetryConfig;
use crate::error::Result;

impl RetryConfig {
    /// Delay before retry number `retry` (0-indexed).
    ///
    /// `min(base_delay * 2^retry, max_delay)` plus up to 10% jitter.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let capped = backoff_delay(self.base_delay, self.max_delay, retry);
        let jitter_ms = u64::try_from(capped.as_millis() / 10).unwrap_or(0);
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }
}

/// `min(base * 2^exponent, max)` without overflow.
#[must_use]
pub fn backoff_delay(base: Duration, max: Duration, exponent: u32) -> Duration {
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Retry `operation` while it fails with a recoverable error.
///
/// Returns the first success, the first non-recoverable error, or the last
/// error once retries are exhausted.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, what: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt + 1 < total_attempts => {
                let delay = config.delay_for_retry(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what,
                    attempt + 1,
                    total_attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
