use shared::order::OrderStatus;
use thiserror::Error;

use super::store::StoreError;

/// Errors surfaced synchronously to the caller of `transition`
#[derive(Error, Debug)]
pub enum TransitionError {
    /// Requested edge is not in the legal graph; order unchanged
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    /// Optimistic concurrency check failed. The caller must reload and
    /// retry; the machine never resolves this silently.
    #[error("stale state: expected {expected}, order is {actual}")]
    StaleState {
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
