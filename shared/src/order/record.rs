//! Order record - the durable view of one order
//!
//! The record keeps a per-transition timestamp map used for SLA and audit
//! purposes. Each entry is written at most once; replaying a transition is
//! a no-op on the map, which makes transition commits idempotent.

use super::status::{DispatchState, OrderStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One admin override, recorded verbatim in the audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideRecord {
    pub operator_id: String,
    pub reason: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Millisecond timestamp of the override
    pub at: i64,
}

/// Durable record of one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    /// Order ID (assigned by the store)
    pub order_id: String,
    /// Human-readable order number
    pub order_number: String,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// Commit sequence, bumped on every status commit (transitions and
    /// overrides). `order:status` events carry it so a recipient can drop
    /// an event older than the last one it saw for the order.
    #[serde(default)]
    pub seq: u64,
    /// Dispatch sub-state (meaningful while in `ready_for_pickup`)
    #[serde(default)]
    pub dispatch_state: DispatchState,
    /// Customer ID
    pub customer_id: String,
    /// Restaurant ID
    pub restaurant_id: String,
    /// Currently assigned delivery partner, if any.
    /// Invariant: at most one non-null partner is active at a time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_partner_id: Option<String>,
    /// Order subtotal
    pub subtotal: f64,
    /// Delivery fee
    #[serde(default)]
    pub delivery_fee: f64,
    /// Total amount
    pub total: f64,
    /// Delivery address reference (resolved by an external service)
    pub delivery_address_id: String,
    /// Creation timestamp (millis)
    pub created_at: i64,
    /// Last update timestamp (millis)
    pub updated_at: i64,
    /// Per-transition timestamps, set once each (millis)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timestamps: BTreeMap<OrderStatus, i64>,
    /// Admin override audit trail
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideRecord>,
}

impl OrderRecord {
    /// Create a freshly placed order
    pub fn new(
        order_id: impl Into<String>,
        customer_id: impl Into<String>,
        restaurant_id: impl Into<String>,
        delivery_address_id: impl Into<String>,
        subtotal: f64,
        delivery_fee: f64,
    ) -> Self {
        let now = crate::util::now_millis();
        let mut record = Self {
            order_id: order_id.into(),
            order_number: crate::util::order_number(),
            status: OrderStatus::Placed,
            seq: 1,
            dispatch_state: DispatchState::Idle,
            customer_id: customer_id.into(),
            restaurant_id: restaurant_id.into(),
            delivery_partner_id: None,
            subtotal,
            delivery_fee,
            total: subtotal + delivery_fee,
            delivery_address_id: delivery_address_id.into(),
            created_at: now,
            updated_at: now,
            timestamps: BTreeMap::new(),
            overrides: Vec::new(),
        };
        record.stamp(OrderStatus::Placed, now);
        record
    }

    /// Record the timestamp for a transition. Returns `false` if the field
    /// was already set (idempotent replay).
    pub fn stamp(&mut self, status: OrderStatus, at: i64) -> bool {
        if self.timestamps.contains_key(&status) {
            return false;
        }
        self.timestamps.insert(status, at);
        true
    }

    /// Timestamp of a past transition, if it happened
    pub fn timestamp_of(&self, status: OrderStatus) -> Option<i64> {
        self.timestamps.get(&status).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> OrderRecord {
        OrderRecord::new("o-1", "c-1", "r-1", "addr-1", 24.5, 3.0)
    }

    #[test]
    fn new_order_is_placed_and_stamped() {
        let r = record();
        assert_eq!(r.status, OrderStatus::Placed);
        assert_eq!(r.seq, 1);
        assert_eq!(r.total, 27.5);
        assert!(r.timestamp_of(OrderStatus::Placed).is_some());
        assert!(r.delivery_partner_id.is_none());
    }

    #[test]
    fn stamp_is_set_once() {
        let mut r = record();
        assert!(r.stamp(OrderStatus::Accepted, 1000));
        assert!(!r.stamp(OrderStatus::Accepted, 2000));
        assert_eq!(r.timestamp_of(OrderStatus::Accepted), Some(1000));
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut r = record();
        r.stamp(OrderStatus::Accepted, 1000);
        r.overrides.push(OverrideRecord {
            operator_id: "op-1".to_string(),
            reason: "customer called".to_string(),
            from: OrderStatus::Accepted,
            to: OrderStatus::Cancelled,
            at: 2000,
        });
        let json = serde_json::to_string(&r).unwrap();
        let back: OrderRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
