//! Placement retry policy.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::non_zero_or;

/// Backoff used when the config leaves it unset.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// One retry after a fixed backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy. A zero backoff falls back to the default.
    pub fn new(backoff: Duration) -> Self {
        Self {
            backoff: non_zero_or(backoff, DEFAULT_RETRY_BACKOFF),
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Runs `op`; on failure sleeps once and runs it a second time.
    ///
    /// `op` receives the attempt number (1 or 2). The second attempt's result
    /// is returned as is.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match op(1).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, backoff_ms = self.backoff.as_millis() as u64, "Attempt failed, retrying");
                tokio::time::sleep(self.backoff).await;
                op(2).await
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_zero_backoff_uses_default() {
        assert_eq!(RetryPolicy::new(Duration::ZERO).backoff(), DEFAULT_RETRY_BACKOFF);
        assert_eq!(
            RetryPolicy::new(Duration::from_millis(5)).backoff(),
            Duration::from_millis(5)
        );
    }

    #[tokio::test]
    async fn test_success_does_not_retry() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_millis(1));

        let result: Result<u32, String> = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(attempt) }
            })
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exactly_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_millis(1));

        let result: Result<u32, String> = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {} failed", attempt)) }
            })
            .await;

        assert_eq!(result, Err("attempt 2 failed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_attempt_result_returned() {
        let policy = RetryPolicy::new(Duration::from_millis(1));

        let result: Result<&str, &str> = policy
            .run(|attempt| async move {
                if attempt == 1 { Err("boom") } else { Ok("filled") }
            })
            .await;

        assert_eq!(result, Ok("filled"));
    }
}
