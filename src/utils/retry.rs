use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Conflict Retry with Exponential Backoff
// ============================================================================
//
// Workflow operations never retry internally. A caller that gets a transient
// error (a concurrent modification) re-runs the whole operation, which
// reloads the order and re-checks every guard.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Still transient after every attempt
    Failed(E),
    /// Not worth retrying
    PermanentFailure(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed(err) | RetryResult::PermanentFailure(err) => Err(err),
        }
    }
}

/// Whether an error may succeed if the operation is simply run again.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
/// The closure receives the 1-based attempt number.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    tracing::debug!(error = %error, "Permanent failure, not retrying");
                    return RetryResult::PermanentFailure(error);
                }

                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempt,
                        error = %error,
                        "Operation still conflicting after all retries"
                    );
                    return RetryResult::Failed(error);
                }

                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );

                sleep(delay).await;

                delay = Duration::from_millis(((delay.as_millis() as f64) * config.multiplier) as u64);
                delay = delay.min(config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let order_id = Uuid::new_v4();

        let result = retry_on_transient(&fast(), |_attempt| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(OrderError::ConcurrencyConflict(order_id))
                } else {
                    Ok("committed")
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("committed")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_guard_failures_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_on_transient(&fast(), |_attempt| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(OrderError::validation("title", "cannot be empty"))
            }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentFailure(OrderError::Validation { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let order_id = Uuid::new_v4();
        let result = retry_on_transient(&fast(), |_attempt| async move {
            Err::<(), _>(OrderError::ConcurrencyConflict(order_id))
        })
        .await;

        assert!(matches!(result, RetryResult::Failed(_)));
        assert!(result.into_result().is_err());
    }
}
