//! 调度协调器
//!
//! Single owner of all dispatch activity. The coordinator task holds the
//! only map of in-flight searches; per-order worker tasks run the
//! offer/wait/resolve loop and report back through the same inbox, so
//! every signal about an order is serialized through one place.
//!
//! 重试分两层:
//!
//! - business rounds: a search round that exhausts its candidates defers
//!   the next round through the job runner with exponential backoff
//! - infrastructure attempts: the job runner's own bounded retries when a
//!   handler fails (see `jobs::TokioJobRunner`)

use shared::dispatch::{AttemptOutcome, JobKind, RetryJob};
use shared::order::{DispatchState, OrderRecord, OrderStatus};
use shared::realtime::ServerEvent;
use shared::types::Actor;
use shared::util::now_millis;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::DispatchConfig;
use crate::jobs::JobRunner;
use crate::lifecycle::{LifecycleMachine, OrderStore, TransitionError, TransitionRequest};
use crate::realtime::Broadcaster;

use super::availability::PartnerAvailability;
use super::ledger::AttemptLedger;

/// Commands accepted by the coordinator inbox
#[derive(Debug)]
pub enum DispatchCommand {
    /// An order entered `ready_for_pickup`; begin (or resume) searching
    Start { order_id: String },
    /// A partner answered an outstanding offer
    Answer {
        order_id: String,
        partner_id: String,
        attempt: u32,
        accept: bool,
    },
    /// A deferred search round became due
    Retry { job: RetryJob },
    /// The order reached a terminal status; stop all dispatch activity
    OrderClosed { order_id: String },
    /// A worker finished its round (internal)
    WorkerDone {
        order_id: String,
        outcome: WorkerOutcome,
    },
}

/// How one search round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// A partner accepted; the order moved on
    Assigned,
    /// Candidates exhausted; a retry round is scheduled
    AwaitingRetry { round: u32 },
    /// Retry budget spent; a human has to assign the order
    ManualNeeded,
    /// The order closed (or its status moved) under the worker's feet
    Aborted,
}

/// Signals forwarded from the coordinator to an active worker
#[derive(Debug)]
enum WorkerSignal {
    Answer {
        partner_id: String,
        attempt: u32,
        accept: bool,
    },
    Closed,
}

/// Per-order dispatch state held by the coordinator task
enum OrderEntry {
    /// A worker task is running this order's current round
    Active { tx: mpsc::Sender<WorkerSignal> },
    /// Waiting for a scheduled retry round to become due
    AwaitingRetry { round: u32 },
    /// Escalated; only a fresh `Start` resumes automatic dispatch
    ManualNeeded,
}

enum OfferResult {
    Accepted,
    NextCandidate,
    Abort,
}

pub struct DispatchCoordinator {
    store: Arc<dyn OrderStore>,
    machine: Arc<LifecycleMachine>,
    broadcaster: Arc<Broadcaster>,
    availability: Arc<dyn PartnerAvailability>,
    ledger: Arc<AttemptLedger>,
    jobs: Arc<dyn JobRunner>,
    config: DispatchConfig,
    /// Clone of the coordinator's own inbox sender, used by workers and
    /// the retry-job handler
    tx: mpsc::Sender<DispatchCommand>,
}

impl DispatchCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn OrderStore>,
        machine: Arc<LifecycleMachine>,
        broadcaster: Arc<Broadcaster>,
        availability: Arc<dyn PartnerAvailability>,
        ledger: Arc<AttemptLedger>,
        jobs: Arc<dyn JobRunner>,
        config: DispatchConfig,
        tx: mpsc::Sender<DispatchCommand>,
    ) -> Self {
        Self {
            store,
            machine,
            broadcaster,
            availability,
            ledger,
            jobs,
            config,
            tx,
        }
    }

    /// Coordinator main loop; runs until shutdown or the inbox closes
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<DispatchCommand>,
        shutdown: CancellationToken,
    ) {
        let mut orders: HashMap<String, OrderEntry> = HashMap::new();
        tracing::info!("Dispatch coordinator started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    Self::handle(&self, cmd, &mut orders).await;
                }
            }
        }
        tracing::info!(in_flight = orders.len(), "Dispatch coordinator stopped");
    }

    async fn handle(
        this: &Arc<Self>,
        cmd: DispatchCommand,
        orders: &mut HashMap<String, OrderEntry>,
    ) {
        match cmd {
            DispatchCommand::Start { order_id } => match orders.get(&order_id) {
                Some(OrderEntry::Active { .. }) | Some(OrderEntry::AwaitingRetry { .. }) => {
                    // already searching; the coordinator's own fallback
                    // transitions echo Start back here
                    tracing::debug!(order_id = %order_id, "Start ignored, search in flight");
                }
                Some(OrderEntry::ManualNeeded) | None => {
                    Self::spawn_worker(this, order_id, 1, orders);
                }
            },

            DispatchCommand::Answer {
                order_id,
                partner_id,
                attempt,
                accept,
            } => {
                let forwarded = match orders.get(&order_id) {
                    Some(OrderEntry::Active { tx }) => tx
                        .send(WorkerSignal::Answer {
                            partner_id: partner_id.clone(),
                            attempt,
                            accept,
                        })
                        .await
                        .is_ok(),
                    _ => false,
                };
                if !forwarded && accept {
                    // answer landed after the offer was already settled
                    tracing::info!(
                        order_id = %order_id,
                        partner_id = %partner_id,
                        attempt,
                        "Late accept discarded"
                    );
                    this.broadcaster.send_to_partner(
                        &partner_id,
                        &ServerEvent::DeliveryReassigned {
                            order_id: order_id.clone(),
                        },
                    );
                }
            }

            DispatchCommand::Retry { job } => match orders.get(&job.order_id) {
                Some(OrderEntry::AwaitingRetry { round }) if *round == job.round => {
                    tracing::info!(
                        order_id = %job.order_id,
                        round = job.round,
                        "Retry round due"
                    );
                    Self::spawn_worker(this, job.order_id.clone(), job.round, orders);
                }
                _ => {
                    tracing::debug!(
                        order_id = %job.order_id,
                        round = job.round,
                        "Stale retry job ignored"
                    );
                }
            },

            DispatchCommand::OrderClosed { order_id } => match orders.get(&order_id) {
                Some(OrderEntry::Active { tx }) => {
                    // worker resolves the pending offer and reports back
                    let _ = tx.send(WorkerSignal::Closed).await;
                }
                Some(_) => {
                    orders.remove(&order_id);
                    tracing::debug!(order_id = %order_id, "Pending dispatch dropped, order closed");
                }
                None => {}
            },

            DispatchCommand::WorkerDone { order_id, outcome } => match outcome {
                WorkerOutcome::Assigned | WorkerOutcome::Aborted => {
                    orders.remove(&order_id);
                }
                WorkerOutcome::AwaitingRetry { round } => {
                    orders.insert(order_id, OrderEntry::AwaitingRetry { round });
                }
                WorkerOutcome::ManualNeeded => {
                    orders.insert(order_id, OrderEntry::ManualNeeded);
                }
            },
        }
    }

    fn spawn_worker(
        this: &Arc<Self>,
        order_id: String,
        round: u32,
        orders: &mut HashMap<String, OrderEntry>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        orders.insert(order_id.clone(), OrderEntry::Active { tx });
        let coordinator = this.clone();
        tokio::spawn(async move {
            let outcome = coordinator.search_round(&order_id, round, rx).await;
            let _ = coordinator
                .tx
                .send(DispatchCommand::WorkerDone { order_id, outcome })
                .await;
        });
    }

    /// One search round: offer the order to each candidate in turn
    async fn search_round(
        &self,
        order_id: &str,
        round: u32,
        mut signals: mpsc::Receiver<WorkerSignal>,
    ) -> WorkerOutcome {
        let record = match self.store.get(order_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Dispatch aborted, order unreadable");
                return WorkerOutcome::Aborted;
            }
        };
        if record.status != OrderStatus::ReadyForPickup {
            tracing::debug!(
                order_id = %order_id,
                status = %record.status,
                "Dispatch aborted, order no longer ready for pickup"
            );
            return WorkerOutcome::Aborted;
        }

        if let Err(e) = self
            .store
            .set_dispatch_state(order_id, DispatchState::Searching)
            .await
        {
            tracing::error!(order_id = %order_id, error = %e, "Failed to mark order searching");
        }

        let candidates = match self
            .availability
            .find_candidates(&record.restaurant_id, &record.delivery_address_id)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                // an availability outage is absorbed by the retry schedule
                tracing::error!(
                    order_id = %order_id,
                    round,
                    error = %e,
                    "Candidate lookup failed, treating round as empty"
                );
                Vec::new()
            }
        };

        tracing::info!(
            order_id = %order_id,
            round,
            candidates = candidates.len(),
            "Search round started"
        );

        for candidate in &candidates {
            match self.offer_candidate(&record, candidate, &mut signals).await {
                OfferResult::Accepted => return WorkerOutcome::Assigned,
                OfferResult::NextCandidate => continue,
                OfferResult::Abort => return WorkerOutcome::Aborted,
            }
        }

        self.round_exhausted(order_id, round).await
    }

    /// Offer the order to one candidate and wait out the answer window
    async fn offer_candidate(
        &self,
        record: &OrderRecord,
        candidate: &str,
        signals: &mut mpsc::Receiver<WorkerSignal>,
    ) -> OfferResult {
        let order_id = &record.order_id;
        let attempt = match self.ledger.open(order_id, candidate) {
            Ok(attempt) => attempt,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Attempt ledger refused offer");
                return OfferResult::Abort;
            }
        };

        match self
            .machine
            .transition(TransitionRequest {
                order_id: order_id.clone(),
                expected: OrderStatus::ReadyForPickup,
                to: OrderStatus::Assigned,
                actor: Actor::system(),
            })
            .await
        {
            Ok(_) => {}
            Err(TransitionError::StaleState { actual, .. }) => {
                tracing::info!(
                    order_id = %order_id,
                    status = %actual,
                    "Offer skipped, order moved on"
                );
                self.ledger
                    .resolve(order_id, attempt.sequence, AttemptOutcome::Superseded);
                return OfferResult::Abort;
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to mark order assigned");
                self.ledger
                    .resolve(order_id, attempt.sequence, AttemptOutcome::Superseded);
                return OfferResult::Abort;
            }
        }

        self.broadcaster.send_to_partner(
            candidate,
            &ServerEvent::DeliveryRequest {
                order_id: order_id.clone(),
                restaurant_id: record.restaurant_id.clone(),
                delivery_address_id: record.delivery_address_id.clone(),
                expires_in_secs: self.config.offer_timeout.as_secs(),
                attempt: attempt.sequence,
            },
        );
        tracing::info!(
            order_id = %order_id,
            partner_id = %candidate,
            attempt = attempt.sequence,
            "Offer sent"
        );

        let deadline = Instant::now() + self.config.offer_timeout;
        loop {
            match tokio::time::timeout_at(deadline, signals.recv()).await {
                // offer window elapsed
                Err(_) => {
                    self.ledger
                        .resolve(order_id, attempt.sequence, AttemptOutcome::TimedOut);
                    tracing::info!(
                        order_id = %order_id,
                        partner_id = %candidate,
                        attempt = attempt.sequence,
                        "Offer timed out"
                    );
                    self.release_candidate(order_id, candidate).await;
                    return OfferResult::NextCandidate;
                }

                Ok(None) => return OfferResult::Abort,

                Ok(Some(WorkerSignal::Closed)) => {
                    self.ledger
                        .resolve(order_id, attempt.sequence, AttemptOutcome::Superseded);
                    self.broadcaster.send_to_partner(
                        candidate,
                        &ServerEvent::DeliveryReassigned {
                            order_id: order_id.clone(),
                        },
                    );
                    tracing::info!(
                        order_id = %order_id,
                        partner_id = %candidate,
                        "Offer withdrawn, order closed"
                    );
                    return OfferResult::Abort;
                }

                Ok(Some(WorkerSignal::Answer {
                    partner_id,
                    attempt: answered,
                    accept,
                })) => {
                    if partner_id != candidate || answered != attempt.sequence {
                        // echo of an earlier, already-settled offer
                        tracing::debug!(
                            order_id = %order_id,
                            partner_id = %partner_id,
                            attempt = answered,
                            "Stale answer discarded"
                        );
                        if accept {
                            self.broadcaster.send_to_partner(
                                &partner_id,
                                &ServerEvent::DeliveryReassigned {
                                    order_id: order_id.clone(),
                                },
                            );
                        }
                        continue;
                    }

                    if !accept {
                        self.ledger
                            .resolve(order_id, attempt.sequence, AttemptOutcome::Declined);
                        tracing::info!(
                            order_id = %order_id,
                            partner_id = %candidate,
                            attempt = attempt.sequence,
                            "Offer declined"
                        );
                        self.release_candidate(order_id, candidate).await;
                        return OfferResult::NextCandidate;
                    }

                    return self.accept_candidate(order_id, candidate, attempt.sequence).await;
                }
            }
        }
    }

    /// Commit an accepted offer: bind the partner, then advance the order
    async fn accept_candidate(
        &self,
        order_id: &str,
        candidate: &str,
        sequence: u32,
    ) -> OfferResult {
        if let Err(e) = self
            .store
            .set_partner(order_id, Some(candidate.to_string()))
            .await
        {
            tracing::error!(order_id = %order_id, error = %e, "Failed to bind partner");
            self.ledger
                .resolve(order_id, sequence, AttemptOutcome::Superseded);
            return OfferResult::Abort;
        }

        match self
            .machine
            .transition(TransitionRequest {
                order_id: order_id.to_string(),
                expected: OrderStatus::Assigned,
                to: OrderStatus::AcceptedByPartner,
                actor: Actor::new(candidate, shared::types::Role::Partner),
            })
            .await
        {
            Ok(_) => {
                self.ledger
                    .resolve(order_id, sequence, AttemptOutcome::Accepted);
                if let Err(e) = self
                    .store
                    .set_dispatch_state(order_id, DispatchState::Idle)
                    .await
                {
                    tracing::error!(order_id = %order_id, error = %e, "Failed to reset dispatch state");
                }
                tracing::info!(
                    order_id = %order_id,
                    partner_id = %candidate,
                    attempt = sequence,
                    "Offer accepted"
                );
                OfferResult::Accepted
            }
            Err(e) => {
                // order closed between the answer and the commit
                tracing::warn!(
                    order_id = %order_id,
                    partner_id = %candidate,
                    error = %e,
                    "Accept could not be committed"
                );
                if let Err(e) = self.store.set_partner(order_id, None).await {
                    tracing::error!(order_id = %order_id, error = %e, "Failed to unbind partner");
                }
                self.ledger
                    .resolve(order_id, sequence, AttemptOutcome::Superseded);
                self.broadcaster.send_to_partner(
                    candidate,
                    &ServerEvent::DeliveryReassigned {
                        order_id: order_id.to_string(),
                    },
                );
                OfferResult::Abort
            }
        }
    }

    /// Put a declined/expired order back in the searchable pool
    async fn release_candidate(&self, order_id: &str, candidate: &str) {
        match self
            .machine
            .transition(TransitionRequest {
                order_id: order_id.to_string(),
                expected: OrderStatus::Assigned,
                to: OrderStatus::ReadyForPickup,
                actor: Actor::system(),
            })
            .await
        {
            Ok(_) => {}
            Err(TransitionError::StaleState { actual, .. }) => {
                tracing::debug!(
                    order_id = %order_id,
                    status = %actual,
                    "Release skipped, order moved on"
                );
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to release order");
            }
        }
        self.broadcaster.send_to_partner(
            candidate,
            &ServerEvent::DeliveryReassigned {
                order_id: order_id.to_string(),
            },
        );
    }

    /// All candidates refused or timed out: defer the next round, or give
    /// the order to a human once the retry budget is spent.
    async fn round_exhausted(&self, order_id: &str, round: u32) -> WorkerOutcome {
        if round < self.config.max_retries {
            let next_round = round + 1;
            let delay = self.config.backoff_delay(round);
            let job = RetryJob {
                order_id: order_id.to_string(),
                kind: JobKind::AssignmentRetry,
                run_after: now_millis() + delay.as_millis() as i64,
                round: next_round,
            };
            match self.jobs.enqueue(job).await {
                Ok(job_id) => {
                    tracing::info!(
                        order_id = %order_id,
                        round,
                        next_round,
                        delay_secs = delay.as_secs(),
                        job_id = %job_id,
                        "Search round exhausted, retry scheduled"
                    );
                    return WorkerOutcome::AwaitingRetry { round: next_round };
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %order_id,
                        round,
                        error = %e,
                        "Failed to schedule retry, escalating"
                    );
                }
            }
        }
        self.escalate(order_id, round).await
    }

    async fn escalate(&self, order_id: &str, round: u32) -> WorkerOutcome {
        if let Err(e) = self
            .store
            .set_dispatch_state(order_id, DispatchState::NeedsManualAssignment)
            .await
        {
            tracing::error!(order_id = %order_id, error = %e, "Failed to flag manual assignment");
        }
        self.broadcaster.alert_operators(&ServerEvent::DispatchAlert {
            order_id: order_id.to_string(),
            message: format!("no delivery partner found after {round} search rounds"),
            job: None,
        });
        tracing::warn!(
            order_id = %order_id,
            rounds = round,
            "Dispatch escalated to manual assignment"
        );
        WorkerOutcome::ManualNeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobConfig;
    use crate::dispatch::StaticAvailability;
    use crate::jobs::TokioJobRunner;
    use crate::lifecycle::MemoryOrderStore;
    use crate::realtime::{memory_transport, SessionIdentity};
    use shared::realtime::ServerEvent;
    use shared::types::Role;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        machine: Arc<LifecycleMachine>,
        store: Arc<dyn OrderStore>,
        broadcaster: Arc<Broadcaster>,
        ledger: Arc<AttemptLedger>,
        tx: mpsc::Sender<DispatchCommand>,
        _shutdown: CancellationToken,
    }

    fn harness(availability: StaticAvailability, config: DispatchConfig) -> Harness {
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let ledger = Arc::new(AttemptLedger::new());
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(64);

        let machine = Arc::new(LifecycleMachine::new(
            store.clone(),
            broadcaster.clone(),
            tx.clone(),
        ));

        let runner = Arc::new(TokioJobRunner::new(
            JobConfig {
                max_attempts: 3,
                retry_delay: Duration::from_millis(10),
            },
            shutdown.clone(),
        ));
        let retry_tx = tx.clone();
        runner.register(JobKind::AssignmentRetry, move |job| {
            let retry_tx = retry_tx.clone();
            Box::pin(async move {
                retry_tx
                    .send(DispatchCommand::Retry { job })
                    .await
                    .map_err(|e| crate::jobs::JobError::Handler(e.to_string()))
            })
        });

        let coordinator = Arc::new(DispatchCoordinator::new(
            store.clone(),
            machine.clone(),
            broadcaster.clone(),
            Arc::new(availability),
            ledger.clone(),
            runner,
            config,
            tx.clone(),
        ));
        tokio::spawn(coordinator.run(rx, shutdown.clone()));

        Harness {
            machine,
            store,
            broadcaster,
            ledger,
            tx,
            _shutdown: shutdown,
        }
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            offer_timeout: Duration::from_millis(100),
            retry_base_delay: Duration::from_millis(20),
            retry_max_delay: Duration::from_millis(80),
            max_retries: 2,
        }
    }

    fn connect_partner(h: &Harness, partner_id: &str) -> UnboundedReceiver<ServerEvent> {
        let (transport, rx) = memory_transport();
        h.broadcaster.connect(
            format!("s-{partner_id}"),
            SessionIdentity {
                subject_id: partner_id.to_string(),
                role: Role::Partner,
            },
            transport,
        );
        rx
    }

    async fn ready_order(h: &Harness) -> String {
        let order = h
            .machine
            .place("c-1", "r-1", "addr-1", 20.0, 3.0)
            .await
            .unwrap();
        for (from, to) in [
            (OrderStatus::Placed, OrderStatus::RestaurantNotified),
            (OrderStatus::RestaurantNotified, OrderStatus::Accepted),
            (OrderStatus::Accepted, OrderStatus::Preparing),
            (OrderStatus::Preparing, OrderStatus::ReadyForPickup),
        ] {
            h.machine
                .transition(TransitionRequest {
                    order_id: order.order_id.clone(),
                    expected: from,
                    to,
                    actor: Actor::system(),
                })
                .await
                .unwrap();
        }
        order.order_id
    }

    async fn await_offer(rx: &mut UnboundedReceiver<ServerEvent>) -> u32 {
        let deadline = Duration::from_secs(2);
        let event = tokio::time::timeout(deadline, async {
            loop {
                match rx.recv().await {
                    Some(ServerEvent::DeliveryRequest { attempt, .. }) => return attempt,
                    Some(_) => continue,
                    None => panic!("partner channel closed"),
                }
            }
        })
        .await
        .expect("no offer arrived");
        event
    }

    async fn await_status(h: &Harness, order_id: &str, status: OrderStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let record = h.store.get(order_id).await.unwrap();
                if record.status == status {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("order never reached {status}"));
    }

    #[tokio::test]
    async fn first_candidate_accepting_assigns_the_order() {
        let h = harness(
            StaticAvailability::fixed(vec!["p-1".to_string()]),
            fast_config(),
        );
        let mut partner = connect_partner(&h, "p-1");
        let order_id = ready_order(&h).await;

        let attempt = await_offer(&mut partner).await;
        assert_eq!(attempt, 1);
        h.tx.send(DispatchCommand::Answer {
            order_id: order_id.clone(),
            partner_id: "p-1".to_string(),
            attempt,
            accept: true,
        })
        .await
        .unwrap();

        await_status(&h, &order_id, OrderStatus::AcceptedByPartner).await;
        let record = h.store.get(&order_id).await.unwrap();
        assert_eq!(record.delivery_partner_id.as_deref(), Some("p-1"));
        assert_eq!(record.dispatch_state, DispatchState::Idle);

        let history = h.ledger.list(&order_id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, AttemptOutcome::Accepted);
    }

    #[tokio::test]
    async fn decline_moves_to_next_candidate() {
        let h = harness(
            StaticAvailability::scripted(vec![vec!["p-1".to_string(), "p-2".to_string()]]),
            fast_config(),
        );
        let mut p1 = connect_partner(&h, "p-1");
        let mut p2 = connect_partner(&h, "p-2");
        let order_id = ready_order(&h).await;

        let attempt = await_offer(&mut p1).await;
        h.tx.send(DispatchCommand::Answer {
            order_id: order_id.clone(),
            partner_id: "p-1".to_string(),
            attempt,
            accept: false,
        })
        .await
        .unwrap();

        let attempt = await_offer(&mut p2).await;
        assert_eq!(attempt, 2);
        h.tx.send(DispatchCommand::Answer {
            order_id: order_id.clone(),
            partner_id: "p-2".to_string(),
            attempt,
            accept: true,
        })
        .await
        .unwrap();

        await_status(&h, &order_id, OrderStatus::AcceptedByPartner).await;
        let record = h.store.get(&order_id).await.unwrap();
        assert_eq!(record.delivery_partner_id.as_deref(), Some("p-2"));

        let outcomes: Vec<_> = h.ledger.list(&order_id).iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AttemptOutcome::Declined, AttemptOutcome::Accepted]
        );
    }

    #[tokio::test]
    async fn silent_candidate_times_out_and_is_notified() {
        let h = harness(
            StaticAvailability::scripted(vec![vec!["p-1".to_string(), "p-2".to_string()]]),
            fast_config(),
        );
        let mut p1 = connect_partner(&h, "p-1");
        let mut p2 = connect_partner(&h, "p-2");
        let order_id = ready_order(&h).await;

        // p-1 never answers
        await_offer(&mut p1).await;
        let attempt = await_offer(&mut p2).await;
        assert_eq!(attempt, 2);

        // the expired candidate was told the order moved on
        let reassigned = tokio::time::timeout(Duration::from_secs(1), p1.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reassigned, ServerEvent::DeliveryReassigned { .. }));

        h.tx.send(DispatchCommand::Answer {
            order_id: order_id.clone(),
            partner_id: "p-2".to_string(),
            attempt,
            accept: true,
        })
        .await
        .unwrap();
        await_status(&h, &order_id, OrderStatus::AcceptedByPartner).await;

        let outcomes: Vec<_> = h.ledger.list(&order_id).iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AttemptOutcome::TimedOut, AttemptOutcome::Accepted]
        );
    }

    #[tokio::test]
    async fn late_accept_from_expired_candidate_is_reassigned() {
        // p-2's window is kept wide so the late answer lands while the
        // second offer is still pending
        let h = harness(
            StaticAvailability::scripted(vec![vec!["p-1".to_string(), "p-2".to_string()]]),
            DispatchConfig {
                offer_timeout: Duration::from_millis(250),
                ..fast_config()
            },
        );
        let mut p1 = connect_partner(&h, "p-1");
        let mut p2 = connect_partner(&h, "p-2");
        let order_id = ready_order(&h).await;

        let first = await_offer(&mut p1).await;
        // drain the timeout notification
        let _ = tokio::time::timeout(Duration::from_secs(1), p1.recv()).await;
        await_offer(&mut p2).await;

        // p-1 answers its long-expired offer while p-2's is pending
        h.tx.send(DispatchCommand::Answer {
            order_id: order_id.clone(),
            partner_id: "p-1".to_string(),
            attempt: first,
            accept: true,
        })
        .await
        .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), p1.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ServerEvent::DeliveryReassigned { .. }));

        // the pending offer is unaffected
        let record = h.store.get(&order_id).await.unwrap();
        assert_eq!(record.status, OrderStatus::Assigned);
        assert!(record.delivery_partner_id.is_none());
    }
}
