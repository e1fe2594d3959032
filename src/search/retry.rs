//! Bounded exponential backoff for transient provider failures.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use super::embedding::EmbeddingProvider;
use crate::error::{Result, SearchError};

/// Retry settings applied to `embed_many` calls.
///
/// Default settings:
/// - Max retries: 3 (4 attempts in total)
/// - Initial delay: 500ms
/// - Max delay: 10 seconds
/// - Multiplier: 2.0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }
}

/// Call `embed_many`, retrying only errors marked retryable.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    policy: &RetryPolicy,
) -> Result<Vec<Vec<f32>>> {
    (move || async move { provider.embed_many(texts).await })
        .retry(policy.backoff())
        .when(SearchError::is_retryable)
        .notify(|err: &SearchError, delay: Duration| {
            warn!(
                provider = provider.provider_tag(),
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "retrying embedding request"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given error for the first `failures` calls.
    struct Flaky {
        failures: usize,
        auth: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for Flaky {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(if self.auth {
                    SearchError::auth("flaky", "401")
                } else {
                    SearchError::unavailable("flaky", "503")
                });
            }
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        fn dimension(&self) -> usize {
            1
        }

        fn provider_tag(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_recovers_from_transient_errors() {
        let p = Flaky { failures: 2, auth: false, calls: AtomicUsize::new(0) };
        let out = embed_with_retry(&p, &["a".into()], &fast_policy(3)).await.unwrap();
        assert_eq!(out, vec![vec![1.0]]);
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let p = Flaky { failures: 10, auth: false, calls: AtomicUsize::new(0) };
        let err = embed_with_retry(&p, &["a".into()], &fast_policy(2)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_not_retried() {
        let p = Flaky { failures: 10, auth: true, calls: AtomicUsize::new(0) };
        let err = embed_with_retry(&p, &["a".into()], &fast_policy(5)).await.unwrap_err();
        assert!(matches!(err, SearchError::ProviderAuthError { .. }));
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
