//! Realtime layer - 房间广播与 WebSocket 接入
//!
//! ```text
//! ┌──────────┐   ServerEvent    ┌─────────────┐   unbounded tx   ┌────────┐
//! │ lifecycle│ ───────────────▶ │ Broadcaster │ ───────────────▶ │ session│
//! │ dispatch │    (by room)     │  rooms map  │   (never blocks) │ writer │
//! └──────────┘                  └─────────────┘                  └────────┘
//! ```
//!
//! Delivery is best-effort and at-most-once. A slow or dead session loses
//! events; it never slows a state transition down.

mod broadcaster;
mod transport;
mod ws;

pub use broadcaster::{Broadcaster, SessionIdentity};
pub use transport::{memory_transport, ChannelTransport, SessionTransport, TransportClosed};
pub use ws::{ws_handler, WsAuth};

/// Tracking room for one order
pub fn order_room(order_id: &str) -> String {
    format!("order:{order_id}")
}

/// Private channel for one subject (`customer:{id}`, `partner:{id}`, ...)
pub fn subject_room(role: shared::types::Role, subject_id: &str) -> String {
    format!("{}:{}", role.as_str(), subject_id)
}

/// Shared channel for every session of one role
pub fn role_room(role: shared::types::Role) -> String {
    format!("role:{}", role.as_str())
}
