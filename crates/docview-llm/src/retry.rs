use std::time::Duration;
use rand::Rng;
use tracing::{debug, warn};

use crate::{LlmError, Result};

/// Retry policy for model calls.
///
/// Transient failures are retried with exponential backoff and jitter; a
/// rate-limit response with a Retry-After hint sleeps for that hint instead
/// (capped at the policy maximum).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    fn backoff_for(&self, attempt: usize, error: &LlmError) -> Duration {
        if let LlmError::RateLimit {
            retry_after: Some(hint),
        } = error
        {
            return (*hint).min(self.max_backoff);
        }

        let base = self.base_backoff.as_millis() as f64 * 2f64.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);
        let with_jitter = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            capped
        };
        Duration::from_millis(with_jitter.min(self.max_backoff.as_millis() as f64) as u64)
    }

    /// Run `f` until it succeeds, a non-retryable error occurs, or attempts
    /// are exhausted. Returns the last error along with the attempt count.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if let Some(previous) = last_error.as_ref() {
                let backoff = self.backoff_for(attempt - 1, previous);
                debug!(
                    attempt = attempt + 1,
                    max = self.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying model call"
                );
                tokio::time::sleep(backoff).await;
            }

            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "model call succeeded on retry");
                    }
                    return (Ok(result), attempt as u32);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_attempts,
                        classification = e.classification(),
                        error = %e,
                        "model call failed"
                    );

                    if !e.is_retryable() {
                        return (Err(e), attempt as u32);
                    }
                    last_error = Some(e);
                }
            }
        }

        let retries = (self.max_attempts.saturating_sub(1)) as u32;
        match last_error {
            Some(e) => (Err(e), retries),
            None => (
                Err(LlmError::Network("no attempts were made".to_string())),
                retries,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let (result, retries) = fast_policy()
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LlmError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(retries, 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let (result, retries) = fast_policy()
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(LlmError::Server("boom".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(retries, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_three_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let (result, _) = fast_policy()
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(LlmError::Network("down".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let (result, _) = fast_policy()
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(LlmError::Unauthorized)
                }
            })
            .await;

        assert!(matches!(result, Err(LlmError::Unauthorized)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::new(5)
            .with_backoff(Duration::from_secs(2), Duration::from_secs(10))
            .with_jitter(false);
        let err = LlmError::Server("x".into());

        assert_eq!(policy.backoff_for(0, &err), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(1, &err), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(2, &err), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(3, &err), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_after_hint_is_respected() {
        let policy = RetryPolicy::default().with_jitter(false);
        let err = LlmError::RateLimit {
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(policy.backoff_for(0, &err), Duration::from_secs(4));

        let long = LlmError::RateLimit {
            retry_after: Some(Duration::from_secs(120)),
        };
        assert_eq!(policy.backoff_for(0, &long), Duration::from_secs(10));
    }
}
