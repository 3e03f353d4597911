//! Dispatch coordination - 配送调度
//!
//! ```text
//!                    ┌────────────────────────────┐
//!  Start/Answer ───▶ │  DispatchCoordinator       │
//!  Retry/Closed      │  (single inbox, owns the   │
//!  WorkerDone        │   per-order worker map)    │
//!                    └──────────┬─────────────────┘
//!                               │ one worker task per searching order
//!                               ▼
//!                    ┌────────────────────────────┐
//!                    │ offer → wait → resolve     │
//!                    │ sequential, one candidate  │
//!                    │ at a time                  │
//!                    └────────────────────────────┘
//! ```
//!
//! Exactly one worker may act on an order at a time; every external signal
//! (partner answers, retry jobs, order closure) funnels through the
//! coordinator inbox, so there is no per-order locking anywhere.

mod availability;
mod coordinator;
mod ledger;

pub use availability::{AvailabilityError, PartnerAvailability, StaticAvailability};
pub use coordinator::{DispatchCommand, DispatchCoordinator, WorkerOutcome};
pub use ledger::{AttemptLedger, LedgerError};
