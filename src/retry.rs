//! Bounded retry with exponential backoff.

use crate::error::PolysubError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to retry a transient failure and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// The error that ended a retried operation.
#[derive(Debug)]
pub struct RetryFailure {
    /// Retries performed before giving up (0 when the first failure was not transient).
    pub retries: u32,
    pub error: PolysubError,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                debug!("{}: retry {} after {}ms", label, attempt, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => {
                    return Err(RetryFailure {
                        retries: attempt,
                        error,
                    });
                }
                Err(error) if attempt >= self.max_retries => {
                    return Err(RetryFailure {
                        retries: attempt,
                        error,
                    });
                }
                Err(error) => {
                    warn!(
                        "{}: attempt {}/{} failed: {}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        error
                    );
                    attempt += 1;
                }
            }
        }
    }
}
