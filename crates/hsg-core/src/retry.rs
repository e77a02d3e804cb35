//! Exponential backoff for operations the persistence and embedding
//! contracts mark retryable (`HsgError::Transient`, `is_retryable()`).

use std::time::Duration;

use crate::errors::{HsgError, Result};

/// Default retry policy: 3 attempts, starting at 50ms, doubling each
/// attempt, capped at 2s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(millis.min(self.max_delay_ms))
    }
}

/// Runs `f` up to `policy.max_attempts` times, sleeping with exponential
/// backoff between attempts. Only `HsgError::is_retryable()` errors are
/// retried; anything else returns immediately.
pub async fn with_backoff<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                tracing::warn!(attempt, error = %e, "retrying transient failure");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Convenience alias for [`with_backoff`] using [`RetryPolicy::default`].
pub async fn with_default_backoff<F, Fut, T>(f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    with_backoff(RetryPolicy::default(), f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_default_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, HsgError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };
        let result = with_backoff(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(HsgError::Transient("not yet".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_default_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HsgError::InvalidArgument("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let result: Result<i32> = with_backoff(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HsgError::Transient("still failing".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
