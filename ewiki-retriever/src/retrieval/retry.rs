//! Retry helpers with linear backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// How often, and how patiently, a failed operation is tried again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try). Never less than 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Scales the linear growth of the delay.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(2, Duration::from_millis(1000), 1.0)
    }
}

impl RetryPolicy {
    /// A policy allowing `retries` retries after the first attempt.
    pub fn with_retries(retries: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay,
            backoff_multiplier,
        }
    }

    /// Up to `max_attempts` attempts with no delay between them.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after the `failed_attempts`-th consecutive failure:
    /// `base_delay * backoff_multiplier * failed_attempts`.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let factor = self.backoff_multiplier * f64::from(failed_attempts);
        if !factor.is_finite() || factor <= 0.0 {
            return Duration::ZERO;
        }
        self.base_delay.mul_f64(factor)
    }
}

/// Retry a fallible async operation with linear backoff.
///
/// `op` receives the 1-based attempt number. Every error is treated as
/// retryable; the last error is returned once `policy.max_attempts` attempts
/// have failed.
pub async fn retry_async<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts {
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation,
                    attempt,
                    max_attempts,
                    error,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));

        let policy = RetryPolicy::with_retries(4, Duration::from_millis(100), 1.5);
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
        assert_eq!(RetryPolicy::immediate(5).delay_for(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_obeys_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = calls.clone();

        let result: Result<u32, String> =
            retry_async(RetryPolicy::immediate(3), "test", |attempt| {
                let calls = calls_task.clone();
                async move {
                    calls.fetch_add(1, Ordering::Relaxed);
                    if attempt < 3 {
                        Err(format!("failure {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let result: Result<(), String> =
            retry_async(RetryPolicy::immediate(2), "test", |attempt| async move {
                Err(format!("failure {attempt}"))
            })
            .await;
        assert_eq!(result, Err("failure 2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_between_attempts() {
        let policy = RetryPolicy::with_retries(2, Duration::from_secs(1), 1.0);
        let started = tokio::time::Instant::now();

        let result: Result<(), &str> = retry_async(policy, "test", |_| async { Err("down") }).await;

        assert!(result.is_err());
        // 1s after the first failure, 2s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
