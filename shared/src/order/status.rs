//! Order status and the legal-edge table
//!
//! The happy path is linear:
//!
//! ```text
//! placed → restaurant_notified → accepted → preparing → ready_for_pickup
//!        → assigned → accepted_by_partner → picked_up → on_the_way → delivered
//! ```
//!
//! Alternate branches end in `rejected`, `cancelled` or `refunded`.
//! Admin interventions may bypass this table entirely; those transitions
//! are recorded as flagged overrides on the order record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Customer placed the order
    Placed,
    /// Restaurant has been notified
    RestaurantNotified,
    /// Restaurant accepted
    Accepted,
    /// Kitchen is preparing
    Preparing,
    /// Food ready, waiting for a delivery partner
    ReadyForPickup,
    /// An assignment offer is out to a partner
    Assigned,
    /// Partner confirmed the assignment
    AcceptedByPartner,
    /// Partner picked up the order
    PickedUp,
    /// Partner en route to the customer
    OnTheWay,
    /// Delivered to the customer (terminal)
    Delivered,
    /// Restaurant rejected the order (terminal)
    Rejected,
    /// Order cancelled (terminal)
    Cancelled,
    /// Payment refunded (terminal)
    Refunded,
}

impl OrderStatus {
    /// All statuses, in happy-path order followed by the alternates
    pub const ALL: [OrderStatus; 13] = [
        OrderStatus::Placed,
        OrderStatus::RestaurantNotified,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::ReadyForPickup,
        OrderStatus::Assigned,
        OrderStatus::AcceptedByPartner,
        OrderStatus::PickedUp,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Whether the delivery lifecycle is over for this order.
    ///
    /// Dispatch workers abort as soon as the order reaches a terminal
    /// status. `rejected` and `cancelled` keep a single legal edge to
    /// `refunded` for payment bookkeeping; that does not reopen dispatch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Rejected
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
        )
    }

    /// Legal-edge table: may an ordinary (non-override) transition move an
    /// order from `self` to `next`?
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            // Happy path
            (Placed, RestaurantNotified)
            | (RestaurantNotified, Accepted)
            | (Accepted, Preparing)
            | (Preparing, ReadyForPickup)
            | (ReadyForPickup, Assigned)
            | (Assigned, AcceptedByPartner)
            | (AcceptedByPartner, PickedUp)
            | (PickedUp, OnTheWay)
            | (OnTheWay, Delivered) => true,

            // Dispatch fallbacks: declined/timed-out offer returns the order
            // to the search pool; a partner drop re-opens the offer.
            (Assigned, ReadyForPickup) | (AcceptedByPartner, Assigned) => true,

            // Restaurant refusal
            (Placed, Rejected) | (RestaurantNotified, Rejected) => true,

            // Cancellation from any non-terminal state
            (from, Cancelled) if !from.is_terminal() => true,

            // Refund bookkeeping after the order is over
            (Rejected, Refunded) | (Cancelled, Refunded) => true,

            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::RestaurantNotified => "RESTAURANT_NOTIFIED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::AcceptedByPartner => "ACCEPTED_BY_PARTNER",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::OnTheWay => "ON_THE_WAY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        };
        write!(f, "{s}")
    }
}

/// Dispatch sub-state carried alongside `ready_for_pickup`
///
/// Not a lifecycle status: the order stays in `ready_for_pickup` while the
/// coordinator searches; `NeedsManualAssignment` flags exhausted retries
/// for operator attention without losing the order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchState {
    /// No dispatch activity
    #[default]
    Idle,
    /// Coordinator is looking for candidates
    Searching,
    /// All candidates and retries exhausted; a human must force-assign
    NeedsManualAssignment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [
            OrderStatus::Placed,
            OrderStatus::RestaurantNotified,
            OrderStatus::Accepted,
            OrderStatus::Preparing,
            OrderStatus::ReadyForPickup,
            OrderStatus::Assigned,
            OrderStatus::AcceptedByPartner,
            OrderStatus::PickedUp,
            OrderStatus::OnTheWay,
            OrderStatus::Delivered,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn no_edges_leave_delivered_or_refunded() {
        for next in OrderStatus::ALL {
            assert!(!OrderStatus::Delivered.can_transition_to(next));
            assert!(!OrderStatus::Refunded.can_transition_to(next));
        }
    }

    #[test]
    fn cancel_is_reachable_from_every_non_terminal() {
        for from in OrderStatus::ALL {
            if !from.is_terminal() {
                assert!(from.can_transition_to(OrderStatus::Cancelled));
            }
        }
    }

    #[test]
    fn skipping_ahead_is_illegal() {
        assert!(!OrderStatus::Placed.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Accepted.can_transition_to(OrderStatus::Assigned));
        assert!(!OrderStatus::ReadyForPickup.can_transition_to(OrderStatus::AcceptedByPartner));
        assert!(!OrderStatus::PickedUp.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn backward_edges_limited_to_dispatch_fallbacks() {
        assert!(OrderStatus::Assigned.can_transition_to(OrderStatus::ReadyForPickup));
        assert!(OrderStatus::AcceptedByPartner.can_transition_to(OrderStatus::Assigned));
        assert!(!OrderStatus::Preparing.can_transition_to(OrderStatus::Accepted));
        assert!(!OrderStatus::OnTheWay.can_transition_to(OrderStatus::PickedUp));
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OrderStatus::ReadyForPickup).unwrap();
        assert_eq!(json, "\"READY_FOR_PICKUP\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::ReadyForPickup);
    }
}
