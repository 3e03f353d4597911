//! Assignment attempt ledger
//!
//! Append-only history of offers per order. The ledger enforces the
//! one-offer-at-a-time rule: opening a new attempt while another is still
//! pending is a bug in the caller and is rejected.

use dashmap::DashMap;
use shared::dispatch::{AssignmentAttempt, AttemptOutcome};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("order {order_id} already has a pending attempt for partner {partner_id}")]
    PendingExists {
        order_id: String,
        partner_id: String,
    },
}

#[derive(Default)]
pub struct AttemptLedger {
    attempts: DashMap<String, Vec<AssignmentAttempt>>,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new pending attempt for `partner_id`. The sequence number is
    /// the 1-based position in the order's full history, across rounds.
    pub fn open(
        &self,
        order_id: &str,
        partner_id: &str,
    ) -> Result<AssignmentAttempt, LedgerError> {
        let mut history = self.attempts.entry(order_id.to_string()).or_default();
        if let Some(pending) = history.iter().find(|a| !a.outcome.is_terminal()) {
            return Err(LedgerError::PendingExists {
                order_id: order_id.to_string(),
                partner_id: pending.partner_id.clone(),
            });
        }
        let attempt = AssignmentAttempt::offer(order_id, partner_id, history.len() as u32 + 1);
        history.push(attempt.clone());
        Ok(attempt)
    }

    /// Resolve the attempt with the given sequence number. Attempts resolve
    /// at most once; a second resolution is a no-op.
    pub fn resolve(&self, order_id: &str, sequence: u32, outcome: AttemptOutcome) {
        if let Some(mut history) = self.attempts.get_mut(order_id) {
            if let Some(attempt) = history.iter_mut().find(|a| a.sequence == sequence) {
                attempt.resolve(outcome);
            }
        }
    }

    /// Full offer history for one order, oldest first
    pub fn list(&self, order_id: &str) -> Vec<AssignmentAttempt> {
        self.attempts
            .get(order_id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// The currently pending attempt, if any
    pub fn pending(&self, order_id: &str) -> Option<AssignmentAttempt> {
        self.attempts
            .get(order_id)?
            .iter()
            .find(|a| !a.outcome.is_terminal())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_grow_across_rounds() {
        let ledger = AttemptLedger::new();
        let a1 = ledger.open("o-1", "p-1").unwrap();
        assert_eq!(a1.sequence, 1);
        ledger.resolve("o-1", 1, AttemptOutcome::TimedOut);

        let a2 = ledger.open("o-1", "p-2").unwrap();
        assert_eq!(a2.sequence, 2);
        ledger.resolve("o-1", 2, AttemptOutcome::Accepted);

        let history = ledger.list("o-1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome, AttemptOutcome::TimedOut);
        assert_eq!(history[1].outcome, AttemptOutcome::Accepted);
    }

    #[test]
    fn second_pending_attempt_is_rejected() {
        let ledger = AttemptLedger::new();
        ledger.open("o-1", "p-1").unwrap();
        let err = ledger.open("o-1", "p-2").unwrap_err();
        assert!(matches!(err, LedgerError::PendingExists { .. }));
    }

    #[test]
    fn resolve_is_idempotent() {
        let ledger = AttemptLedger::new();
        ledger.open("o-1", "p-1").unwrap();
        ledger.resolve("o-1", 1, AttemptOutcome::Declined);
        ledger.resolve("o-1", 1, AttemptOutcome::Accepted);
        assert_eq!(ledger.list("o-1")[0].outcome, AttemptOutcome::Declined);
        assert!(ledger.pending("o-1").is_none());
    }
}
