//! Bounded retry with exponential backoff for REST calls.

use std::future::Future;
use std::time::Duration;

use cribz_shared::ApiError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (zero-based): `base * 2^retry`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a 401, or retries run out.
    ///
    /// A 401 means the credential itself was rejected, so it is returned
    /// immediately. Any other failure is retried and the last one is
    /// returned once the budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    tracing::warn!("{} failed (attempt {}): {}", label, retry + 1, e);
                    if retry >= self.max_retries {
                        return Err(e);
                    }
                    let delay = self.delay_for_retry(retry);
                    tracing::info!(
                        "Retrying {} in {:?} ({}/{})",
                        label,
                        delay,
                        retry + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}

/// Run `op` under `policy`. See [`RetryPolicy::run`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    policy.run(label, op).await
}
