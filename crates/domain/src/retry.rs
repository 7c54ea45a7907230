//! Bounded retry of optimistic-concurrency failures.

use std::future::Future;
use std::time::Duration;

use crate::error::DomainError;

/// How many times a command is re-run after a version conflict or a
/// duplicate operation number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Default number of retries after the first attempt.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Creates a policy with the given retry limit.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::from_millis(5),
        }
    }

    /// Sets the base delay between attempts; attempt `n` waits `n * backoff`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the retry limit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retry limit is exhausted. Each call must re-read its inputs.
    pub async fn run<T, F, Fut>(&self, action: &'static str, mut attempt: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    metrics::counter!("stock_conflict_retries_total").increment(1);
                    tracing::debug!(action, retries, error = %err, "retrying after conflict");
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff * retries).await;
                    }
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(action, retries, error = %err, "retry limit exhausted");
                    return Err(err);
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> DomainError {
        DomainError::Conflict {
            entity: "stock_record",
            id: "r".to_string(),
        }
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3).with_backoff(Duration::ZERO);

        let counter = &calls;
        let result = policy
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(conflict())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_conflict_after_limit() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2).with_backoff(Duration::ZERO);

        let counter = &calls;
        let result: Result<(), _> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(conflict())
            })
            .await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_business_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let counter = &calls;
        let result: Result<(), _> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::InvalidInput("bad".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
