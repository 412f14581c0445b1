use uuid::Uuid;

use super::state_machine::{GuardFailure, WorkflowEvent};
use super::value_objects::OrderStatus;
use crate::audit::CodecError;
use crate::collaborators::Action;
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cannot {event} while order is {from}: {guard}")]
    InvalidTransition {
        from: OrderStatus,
        event: WorkflowEvent,
        guard: GuardFailure,
    },

    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Order {0} was modified concurrently, retry the operation")]
    ConcurrencyConflict(Uuid),

    #[error("User {user} is not allowed to {action}")]
    Forbidden { user: Uuid, action: Action },

    #[error("Audit data integrity failure: {0}")]
    Codec(#[from] CodecError),

    #[error("Storage failure")]
    Storage(#[source] anyhow::Error),

    #[error("{collaborator} failure")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl OrderError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        OrderError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        OrderError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// 4xx-class failures the caller can fix by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            OrderError::InvalidTransition { .. }
                | OrderError::Validation { .. }
                | OrderError::NotFound { .. }
                | OrderError::Forbidden { .. }
        )
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => OrderError::not_found(entity, id),
            StoreError::Conflict { order_id } => OrderError::ConcurrencyConflict(order_id),
            StoreError::Codec(e) => OrderError::Codec(e),
            StoreError::Backend(e) => OrderError::Storage(e),
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::ConcurrencyConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_names_the_guard() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Open,
            event: WorkflowEvent::SubmitBudget,
            guard: GuardFailure::WrongSourceState,
        };
        let message = err.to_string();

        assert!(message.contains("submit budget"));
        assert!(message.contains("Open"));
        assert!(err.is_user_correctable());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_storage_errors_do_not_leak_detail() {
        let err = OrderError::from(StoreError::Backend(anyhow::anyhow!(
            "relation \"orders\" does not exist"
        )));

        assert_eq!(err.to_string(), "Storage failure");
        assert!(!err.is_user_correctable());
    }

    #[test]
    fn test_conflict_is_transient() {
        let id = Uuid::new_v4();
        let err = OrderError::from(StoreError::Conflict { order_id: id });

        assert!(matches!(err, OrderError::ConcurrencyConflict(found) if found == id));
        assert!(err.is_transient());
    }
}
