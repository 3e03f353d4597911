//! Order lifecycle types
//!
//! The status enumeration with its legal-edge table, and the order record
//! the server persists through the order store.

mod record;
mod status;

pub use record::{OrderRecord, OverrideRecord};
pub use status::{DispatchState, OrderStatus};
