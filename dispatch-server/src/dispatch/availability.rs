//! Partner availability seam
//!
//! Candidate selection (geo queries, partner load, shift state) lives in
//! an external service; the coordinator only sees an ordered candidate
//! list. An error from the service is treated like an empty round: the
//! normal retry machinery absorbs the outage.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("availability backend error: {0}")]
    Backend(String),
}

/// Source of candidate delivery partners, best first
#[async_trait]
pub trait PartnerAvailability: Send + Sync {
    async fn find_candidates(
        &self,
        restaurant_id: &str,
        delivery_address_id: &str,
    ) -> Result<Vec<String>, AvailabilityError>;
}

/// Scripted availability for tests and standalone runs
///
/// Serves one pre-loaded candidate list per call; once the script runs
/// out it falls back to a fixed list (empty by default).
pub struct StaticAvailability {
    rounds: Mutex<VecDeque<Vec<String>>>,
    fallback: Vec<String>,
}

impl StaticAvailability {
    /// Each call to `find_candidates` consumes the next scripted round
    pub fn scripted(rounds: Vec<Vec<String>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            fallback: Vec::new(),
        }
    }

    /// Every call returns the same candidate list
    pub fn fixed(candidates: Vec<String>) -> Self {
        Self {
            rounds: Mutex::new(VecDeque::new()),
            fallback: candidates,
        }
    }
}

#[async_trait]
impl PartnerAvailability for StaticAvailability {
    async fn find_candidates(
        &self,
        _restaurant_id: &str,
        _delivery_address_id: &str,
    ) -> Result<Vec<String>, AvailabilityError> {
        let next = self.rounds.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}
