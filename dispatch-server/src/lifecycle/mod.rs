//! Order lifecycle - 状态机与订单存储接口
//!
//! The authoritative decision point for "is this transition legal from
//! here". All status writes flow through [`LifecycleMachine`], which
//! enforces the legal-edge table, the optimistic-concurrency check and
//! the persist → broadcast → dispatch side-effect ordering.

mod error;
mod machine;
mod store;

pub use error::TransitionError;
pub use machine::{LifecycleMachine, TransitionRequest};
pub use store::{CasOutcome, MemoryOrderStore, OrderStore, StoreError};
