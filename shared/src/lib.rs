//! Shared types for the dispatch engine
//!
//! Common types used by the server and clients: the order lifecycle
//! enumeration and legal-edge table, order records, assignment-attempt
//! and retry-job types, and the real-time wire protocol.

pub mod dispatch;
pub mod order;
pub mod realtime;
pub mod types;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Order re-exports (for convenient access)
pub use order::{DispatchState, OrderRecord, OrderStatus};

// Realtime re-exports
pub use realtime::{ClientMessage, ServerEvent};
