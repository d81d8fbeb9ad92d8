use crate::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Upper bound on a single attempt; an attempt that overruns counts as transient.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {

    pub fn with_delays(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }

    /// Short, jittered backoff for optimistic transaction conflicts.
    pub fn state_store() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

/// Bound a single attempt. Overrunning yields [`BookingError::TransientStore`], so the
/// caller's retry policy decides whether to try again.
pub async fn with_timeout<Fut, T>(limit: Duration, operation_name: &str, attempt: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Operation '{}' timed out after {:?}", operation_name, limit);
            Err(BookingError::TransientStore(format!(
                "{} timed out after {:?}",
                operation_name, limit
            )))
        }
    }
}

/// Retry a future with exponential backoff.
///
/// Only errors for which [`crate::BookingError::is_retryable`] holds are retried; every
/// other failure is returned immediately. `on_retry` is called before each new attempt.
pub async fn retry_with_backoff<F, Fut, T, R>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    mut on_retry: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: FnMut(u32),
{
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!("Operation '{}' succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        "Operation '{}' failed after {} attempts. Final error: {}",
                        operation_name, config.max_attempts, e
                    );
                    return Err(e);
                }

                warn!(
                    "Operation '{}' failed on attempt {} ({}). Retrying in {:?}...",
                    operation_name, attempt, e, delay
                );
                on_retry(attempt);

                sleep(delay).await;

                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.backoff_multiplier) as u64,
                )
                .min(config.max_delay);

                if config.jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.1 * rand::random::<f64>()) as u64;
                    delay += Duration::from_millis(jitter_ms);
                }

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::with_delays(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let mut retries = 0;

        let result = retry_with_backoff(
            &fast(5),
            "flaky",
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BookingError::TransientStore("busy".into()))
                } else {
                    Ok(42)
                }
            },
            |_| retries += 1,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = retry_with_backoff(
            &fast(5),
            "book",
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BookingError::seat_taken("A1"))
            },
            |_| {},
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = retry_with_backoff(
            &fast(3),
            "busy",
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BookingError::TransientStore("busy".into()))
            },
            |_| {},
        )
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_overrunning_attempt_is_transient() {
        let err = with_timeout(Duration::from_millis(10), "slow", async {
            sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, BookingError::TransientStore(_)));
        assert!(err.is_retryable());
        assert_eq!(
            with_timeout(Duration::from_secs(1), "fast", async { Ok(7) }).await.unwrap(),
            7
        );
    }
}
