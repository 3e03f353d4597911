//! Dispatch bookkeeping types
//!
//! One [`AssignmentAttempt`] per offer to one candidate partner; attempts
//! for an order are strictly sequential, never concurrent. [`RetryJob`] is
//! the unit of deferred work handed to the background job runner when a
//! search round exhausts its candidate list.

use serde::{Deserialize, Serialize};

/// Outcome of one assignment attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    /// Offer sent, waiting for the partner's answer
    Pending,
    /// Partner accepted within the window
    Accepted,
    /// Partner explicitly declined
    Declined,
    /// No answer within the offer window
    TimedOut,
    /// Order was closed (cancelled/overridden) while the offer was out
    Superseded,
}

impl AttemptOutcome {
    pub fn is_terminal(&self) -> bool {
        *self != AttemptOutcome::Pending
    }
}

/// One offer of an order to one candidate delivery partner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentAttempt {
    pub order_id: String,
    pub partner_id: String,
    /// 1-based position in the order's attempt history
    pub sequence: u32,
    /// Millisecond timestamp the offer went out
    pub offered_at: i64,
    pub outcome: AttemptOutcome,
    /// Millisecond timestamp the attempt became terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

impl AssignmentAttempt {
    pub fn offer(order_id: impl Into<String>, partner_id: impl Into<String>, sequence: u32) -> Self {
        Self {
            order_id: order_id.into(),
            partner_id: partner_id.into(),
            sequence,
            offered_at: crate::util::now_millis(),
            outcome: AttemptOutcome::Pending,
            resolved_at: None,
        }
    }

    /// Terminate the attempt. No-op if already terminal.
    pub fn resolve(&mut self, outcome: AttemptOutcome) {
        if self.outcome.is_terminal() {
            return;
        }
        self.outcome = outcome;
        self.resolved_at = Some(crate::util::now_millis());
    }
}

/// Kind of deferred work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// Re-run the candidate search for an order
    AssignmentRetry,
    /// Nudge a party about a stalled order
    Reminder,
}

/// A unit of deferred work tied to an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryJob {
    pub order_id: String,
    pub kind: JobKind,
    /// Absolute millisecond timestamp the job becomes due
    pub run_after: i64,
    /// Business-retry round this job represents (1-based)
    pub round: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_resolves_once() {
        let mut a = AssignmentAttempt::offer("o-1", "p-1", 1);
        assert_eq!(a.outcome, AttemptOutcome::Pending);
        a.resolve(AttemptOutcome::TimedOut);
        let resolved_at = a.resolved_at;
        a.resolve(AttemptOutcome::Accepted);
        assert_eq!(a.outcome, AttemptOutcome::TimedOut);
        assert_eq!(a.resolved_at, resolved_at);
    }
}
