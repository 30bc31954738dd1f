use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Bounded exponential backoff: the wait doubles after every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or runs out
    /// of attempts. Cancellation before an attempt or during a backoff wait
    /// returns `Cancelled`.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let wait = self.backoff_for(attempt);
                    tracing::warn!(
                        "{what} failed (attempt {attempt}/{max_attempts}): {err}. Retrying in {}ms",
                        wait.as_millis()
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RagError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(30), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let token = CancellationToken::new();
        let out = fast_policy(3)
            .run(&token, "op", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RagError::Generation("503".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let token = CancellationToken::new();
        let err = fast_policy(2)
            .run(&token, "op", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RagError::Generation("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_parse_errors() {
        let calls = &AtomicU32::new(0);
        let token = CancellationToken::new();
        let err = fast_policy(5)
            .run(&token, "op", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RagError::Parse("junk".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Parse(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let err = fast_policy(3)
            .run(&token, "op", || async { Ok::<_, RagError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
    }

    #[tokio::test]
    async fn cancelling_during_backoff_returns_cancelled() {
        let calls = &AtomicU32::new(0);
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(1),
        };
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let err = policy
            .run(&token, "op", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RagError::Generation("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
