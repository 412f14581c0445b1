use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::OrderStatus;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

/// Sent after a workflow operation has committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowNotification {
    pub order_id: Uuid,
    pub operation: &'static str,
    pub status: OrderStatus,
    pub actor: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification channel unavailable")]
    Unavailable,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: Uuid, event: &WorkflowNotification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log. Default sink when no broker is configured.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, user_id: Uuid, event: &WorkflowNotification) -> Result<(), NotificationError> {
        tracing::info!(
            user_id = %user_id,
            order_id = %event.order_id,
            operation = event.operation,
            status = %event.status,
            "Notification"
        );
        Ok(())
    }
}

/// Wraps a sink in a circuit breaker so a dead channel is skipped quickly
/// instead of being hit on every operation.
pub struct GuardedNotificationSink<S> {
    inner: S,
    breaker: CircuitBreaker,
}

impl<S: NotificationSink> GuardedNotificationSink<S> {
    pub fn new(inner: S, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<S: NotificationSink> NotificationSink for GuardedNotificationSink<S> {
    async fn notify(&self, user_id: Uuid, event: &WorkflowNotification) -> Result<(), NotificationError> {
        match self.breaker.call(self.inner.notify(user_id, event)).await {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::CircuitOpen) => Err(NotificationError::Unavailable),
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }
}
