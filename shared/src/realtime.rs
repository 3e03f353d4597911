//! Real-time wire protocol
//!
//! JSON messages exchanged over the persistent connection. Server events
//! are tagged with the event name (`order:status`, `delivery:request`, ...);
//! client messages carry subscription management and partner answers.
//!
//! Delivery is at-most-once and best-effort: a client that misses events
//! recovers by polling the order API, never by replay.

use crate::dispatch::RetryJob;
use crate::order::{OrderRecord, OrderStatus};
use serde::{Deserialize, Serialize};

/// Server → client events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Order status changed
    #[serde(rename = "order:status")]
    OrderStatus {
        order_id: String,
        status: OrderStatus,
        /// Per-order commit sequence. Broadcasts from concurrent callers
        /// may interleave on the wire; a recipient drops an event whose
        /// `seq` is lower than the last one it saw for the order.
        seq: u64,
        /// Millisecond timestamp of the transition
        timestamp: i64,
        /// Assigned partner after this transition, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        partner_id: Option<String>,
        /// Set when the transition was an admin override
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_override: bool,
    },

    /// New order for a restaurant (restaurant channel only)
    #[serde(rename = "order:new")]
    OrderNew { order: OrderRecord },

    /// Assignment offer for one candidate partner (targeted, no fan-out)
    #[serde(rename = "delivery:request")]
    DeliveryRequest {
        order_id: String,
        restaurant_id: String,
        delivery_address_id: String,
        /// Seconds the offer stays open
        expires_in_secs: u64,
        /// Attempt sequence number, echoed back in the partner's answer
        attempt: u32,
    },

    /// Partner position update, passed through to the order's room
    #[serde(rename = "delivery:location")]
    DeliveryLocation {
        order_id: String,
        partner_id: String,
        lat: f64,
        lng: f64,
        timestamp: i64,
    },

    /// A previous offer was superseded; the addressed partner no longer
    /// holds the job
    #[serde(rename = "delivery:reassigned")]
    DeliveryReassigned { order_id: String },

    /// High-priority operator alert (operator room only)
    #[serde(rename = "alert:dispatch")]
    DispatchAlert {
        order_id: String,
        message: String,
        /// Retry job that exhausted, when applicable
        #[serde(skip_serializing_if = "Option::is_none")]
        job: Option<RetryJob>,
    },
}

impl ServerEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OrderStatus { .. } => "order:status",
            ServerEvent::OrderNew { .. } => "order:new",
            ServerEvent::DeliveryRequest { .. } => "delivery:request",
            ServerEvent::DeliveryLocation { .. } => "delivery:location",
            ServerEvent::DeliveryReassigned { .. } => "delivery:reassigned",
            ServerEvent::DispatchAlert { .. } => "alert:dispatch",
        }
    }
}

/// Client → server messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join an order's tracking room
    Track { order_id: String },
    /// Leave an order's tracking room
    Untrack { order_id: String },
    /// Partner's answer to an outstanding `delivery:request`
    #[serde(rename = "offer:answer")]
    OfferAnswer {
        order_id: String,
        /// Echo of `DeliveryRequest::attempt`; stale echoes are discarded
        attempt: u32,
        accept: bool,
    },
    /// Partner position update
    Location {
        order_id: String,
        lat: f64,
        lng: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_event_uses_colon_names() {
        let ev = ServerEvent::OrderStatus {
            order_id: "o-1".to_string(),
            status: OrderStatus::Accepted,
            seq: 3,
            timestamp: 123,
            partner_id: None,
            is_override: false,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "order:status");
        assert_eq!(json["status"], "ACCEPTED");
        // best-effort fields elided when unset
        assert!(json.get("partner_id").is_none());
        assert!(json.get("is_override").is_none());
    }

    #[test]
    fn client_message_round_trip() {
        let msg = ClientMessage::OfferAnswer {
            order_id: "o-1".to_string(),
            attempt: 2,
            accept: true,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("offer:answer"));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
