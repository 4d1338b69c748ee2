//! Exponential backoff on HTTP 429 responses.

use crate::error::IngestResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy applied to rate-limited upstream calls
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Log-and-continue baseline: no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 1_000,
            multiplier: 2.0,
            max_backoff_ms: 32_000,
        }
    }

    /// Up to five retries doubling from one second
    pub fn rate_limited() -> Self {
        Self {
            max_retries: 5,
            ..Self::none()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let millis = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `operation`, retrying while it fails with a rate-limit error
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> IngestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(error) if error.is_rate_limited() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = %operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limit exceeded, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::rate_limited();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_only_rate_limits() {
        let policy = RetryPolicy::rate_limited();
        let calls = AtomicU32::new(0);

        let result: IngestResult<u32> = policy
            .run("download", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(IngestError::upstream_fetch("recording", Some(429), "slow down"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_policy_returns_first_error() {
        let policy = RetryPolicy::none();
        let calls = AtomicU32::new(0);

        let result: IngestResult<()> = policy
            .run("download", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IngestError::upstream_fetch("recording", Some(429), "slow down"))
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let policy = RetryPolicy::rate_limited();
        let calls = AtomicU32::new(0);

        let result: IngestResult<()> = policy
            .run("download", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IngestError::upstream_fetch("recording", Some(404), "missing"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
