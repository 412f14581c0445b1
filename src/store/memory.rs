use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderRepository, StoreError};
use crate::audit::{AuditEntry, AuditLog, HistoryQuery, TrackedField};
use crate::domain::order::Order;

#[derive(Default)]
struct MemoryState {
    orders: HashMap<Uuid, Order>,
    histories: HashMap<Uuid, Vec<AuditEntry>>,
}

/// In-memory repository for tests and the demo binary.
///
/// A commit takes the write lock once, so the version check, the order write
/// and the history append are applied together or not at all.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn history_len(&self, order_id: Uuid) -> usize {
        let state = self.state.read().await;
        state.histories.get(&order_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn load(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let state = self.state.read().await;
        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| StoreError::order_not_found(order_id))
    }

    async fn commit(
        &self,
        order: &Order,
        expected_version: Option<i64>,
        entries: &[AuditEntry],
    ) -> Result<i64, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("in-memory store is unavailable")));
        }

        let mut state = self.state.write().await;
        let stored_version = state.orders.get(&order.id).map(|o| o.version);

        let new_version = match (expected_version, stored_version) {
            (None, None) => 1,
            (Some(expected), Some(current)) if expected == current => current + 1,
            (Some(_), None) => return Err(StoreError::order_not_found(order.id)),
            _ => return Err(StoreError::Conflict { order_id: order.id }),
        };

        let mut stored = order.clone();
        stored.version = new_version;
        state.orders.insert(order.id, stored);
        state
            .histories
            .entry(order.id)
            .or_default()
            .extend(entries.iter().cloned());

        Ok(new_version)
    }

    async fn history(
        &self,
        order_id: Uuid,
        field: Option<TrackedField>,
        query: &HistoryQuery,
    ) -> Result<(Vec<AuditEntry>, u64), StoreError> {
        let state = self.state.read().await;
        if !state.orders.contains_key(&order_id) {
            return Err(StoreError::order_not_found(order_id));
        }
        let entries = state.histories.get(&order_id).map_or(&[][..], Vec::as_slice);
        Ok(AuditLog::select(entries, field, query))
    }

    async fn find_history_entry(&self, entry_id: Uuid) -> Result<Option<AuditEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .histories
            .values()
            .flatten()
            .find(|entry| entry.id == entry_id)
            .cloned())
    }
}
