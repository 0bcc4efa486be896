//! Retry with exponential backoff.
//!
//! Used by both the login handshake and regular API requests.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay; retry `n` waits `backoff_factor * 2^n`.
    pub backoff_factor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff_factor.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay(retry);
                    warn!(
                        attempt = retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if retry > 0 {
                        debug!(attempts = retry + 1, error = %e, "Giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}
