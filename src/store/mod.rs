use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::{AuditEntry, CodecError, HistoryQuery, TrackedField};
use crate::domain::order::Order;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

// ============================================================================
// Order Repository
// ============================================================================
//
// Persists the order aggregate (items, components, services, motor info)
// together with the audit entries produced by one operation. `commit` is a
// single atomic unit guarded by an optimistic version check: a concurrent
// writer surfaces as `StoreError::Conflict`, never as a silent overwrite.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Order {order_id} was modified concurrently")]
    Conflict { order_id: Uuid },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn order_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "order", id }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn load(&self, order_id: Uuid) -> Result<Order, StoreError>;

    /// Persist the order and append `entries` atomically.
    ///
    /// `expected_version` is `None` for a new order. Otherwise it must equal
    /// the stored version or the whole commit is rejected. Returns the new
    /// version.
    async fn commit(
        &self,
        order: &Order,
        expected_version: Option<i64>,
        entries: &[AuditEntry],
    ) -> Result<i64, StoreError>;

    /// One page of an order's history, newest first, plus the filtered total.
    async fn history(
        &self,
        order_id: Uuid,
        field: Option<TrackedField>,
        query: &HistoryQuery,
    ) -> Result<(Vec<AuditEntry>, u64), StoreError>;

    async fn find_history_entry(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, StoreError>;
}
