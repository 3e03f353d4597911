//! Order store interface
//!
//! Durable order state lives outside this process; the engine talks to it
//! through [`OrderStore`]. The store must provide compare-and-swap
//! semantics on the status column: `compare_and_set_status` is the one
//! atomic step that commits a transition and its set-once timestamp.
//!
//! [`MemoryOrderStore`] is the in-process implementation used by the
//! server in standalone mode and by every test.

use async_trait::async_trait;
use dashmap::DashMap;
use shared::order::{DispatchState, OrderRecord, OrderStatus, OverrideRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result of a compare-and-set on the status column
#[derive(Debug)]
pub enum CasOutcome {
    /// Swap applied; the updated record is returned so persist + read is
    /// one atomic step
    Updated(OrderRecord),
    /// Persisted status did not match the expectation
    Stale { actual: OrderStatus },
}

/// Narrow interface to the durable order store (external collaborator)
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> Result<OrderRecord, StoreError>;

    async fn insert(&self, record: OrderRecord) -> Result<(), StoreError>;

    /// Atomically: if the persisted status equals `expected`, set it to
    /// `next`, stamp the transition timestamp (no-op if already stamped),
    /// bump the commit sequence and `updated_at`.
    async fn compare_and_set_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        at: i64,
    ) -> Result<CasOutcome, StoreError>;

    /// Set or clear the assigned delivery partner
    async fn set_partner(
        &self,
        order_id: &str,
        partner_id: Option<String>,
    ) -> Result<OrderRecord, StoreError>;

    /// Update the dispatch sub-state
    async fn set_dispatch_state(
        &self,
        order_id: &str,
        state: DispatchState,
    ) -> Result<OrderRecord, StoreError>;

    /// Apply an admin override: force the status, stamp it, and append the
    /// override entry to the audit trail, in one atomic step.
    async fn apply_override(
        &self,
        order_id: &str,
        entry: OverrideRecord,
    ) -> Result<OrderRecord, StoreError>;
}

/// In-memory order store
///
/// Per-order atomicity comes from the DashMap entry guard: every mutation
/// holds the order's shard lock for its full duration.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: DashMap<String, OrderRecord>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<OrderRecord, StoreError> {
        self.orders
            .get(order_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))
    }

    async fn insert(&self, record: OrderRecord) -> Result<(), StoreError> {
        if self.orders.contains_key(&record.order_id) {
            return Err(StoreError::Backend(format!(
                "order {} already exists",
                record.order_id
            )));
        }
        self.orders.insert(record.order_id.clone(), record);
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
        at: i64,
    ) -> Result<CasOutcome, StoreError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;

        if entry.status != expected {
            return Ok(CasOutcome::Stale {
                actual: entry.status,
            });
        }

        entry.status = next;
        entry.seq += 1;
        entry.stamp(next, at);
        entry.updated_at = at;
        Ok(CasOutcome::Updated(entry.clone()))
    }

    async fn set_partner(
        &self,
        order_id: &str,
        partner_id: Option<String>,
    ) -> Result<OrderRecord, StoreError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        entry.delivery_partner_id = partner_id;
        entry.updated_at = shared::util::now_millis();
        Ok(entry.clone())
    }

    async fn set_dispatch_state(
        &self,
        order_id: &str,
        state: DispatchState,
    ) -> Result<OrderRecord, StoreError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        entry.dispatch_state = state;
        entry.updated_at = shared::util::now_millis();
        Ok(entry.clone())
    }

    async fn apply_override(
        &self,
        order_id: &str,
        entry: OverrideRecord,
    ) -> Result<OrderRecord, StoreError> {
        let mut record = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        record.status = entry.to;
        record.seq += 1;
        record.stamp(entry.to, entry.at);
        record.updated_at = entry.at;
        record.overrides.push(entry);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> OrderRecord {
        OrderRecord::new("o-1", "c-1", "r-1", "addr-1", 20.0, 2.5)
    }

    #[tokio::test]
    async fn cas_applies_on_match_and_stamps_once() {
        let store = MemoryOrderStore::new();
        store.insert(seed()).await.unwrap();

        let out = store
            .compare_and_set_status("o-1", OrderStatus::Placed, OrderStatus::RestaurantNotified, 100)
            .await
            .unwrap();
        let record = match out {
            CasOutcome::Updated(r) => r,
            CasOutcome::Stale { actual } => panic!("unexpected stale: {actual}"),
        };
        assert_eq!(record.status, OrderStatus::RestaurantNotified);
        assert_eq!(record.seq, 2);
        assert_eq!(record.timestamp_of(OrderStatus::RestaurantNotified), Some(100));
    }

    #[tokio::test]
    async fn cas_reports_stale_without_mutating() {
        let store = MemoryOrderStore::new();
        store.insert(seed()).await.unwrap();

        let out = store
            .compare_and_set_status("o-1", OrderStatus::Accepted, OrderStatus::Preparing, 100)
            .await
            .unwrap();
        assert!(matches!(
            out,
            CasOutcome::Stale {
                actual: OrderStatus::Placed
            }
        ));
        let record = store.get("o-1").await.unwrap();
        assert_eq!(record.status, OrderStatus::Placed);
        assert_eq!(record.seq, 1);
        assert!(record.timestamp_of(OrderStatus::Preparing).is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryOrderStore::new();
        store.insert(seed()).await.unwrap();
        assert!(store.insert(seed()).await.is_err());
    }

    #[tokio::test]
    async fn override_appends_audit_entry() {
        let store = MemoryOrderStore::new();
        store.insert(seed()).await.unwrap();

        let record = store
            .apply_override(
                "o-1",
                OverrideRecord {
                    operator_id: "op-9".to_string(),
                    reason: "fraud review".to_string(),
                    from: OrderStatus::Placed,
                    to: OrderStatus::Cancelled,
                    at: 500,
                },
            )
            .await
            .unwrap();
        assert_eq!(record.status, OrderStatus::Cancelled);
        assert_eq!(record.overrides.len(), 1);
        assert_eq!(record.overrides[0].operator_id, "op-9");
    }
}
