use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards an unreliable collaborator (the notification sink). After
// `failure_threshold` consecutive failures calls are refused without being
// attempted until `open_timeout` has passed; then trial calls are let through
// and `success_threshold` successes close the circuit again.
//
// Closed -> Open -> HalfOpen -> Closed (or back to Open on a failed trial)
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
            config,
        }
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.admit::<E>().await?;

        match operation.await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    async fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let cooled_down = inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.open_timeout);
        if !cooled_down {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        tracing::info!("Circuit breaker half-open, allowing trial call");
        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
        Ok(())
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!(successes = inner.success_count, "Circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count += 1;

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                tracing::warn!(failures = inner.failure_count, "Circuit breaker opened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Trial call failed, circuit breaker reopened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.success_count = 0;
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        tracing::info!("Circuit breaker manually reset");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at = None;
    }
}
