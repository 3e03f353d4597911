//! 服务器状态
//!
//! Wires the engine together: store, state machine, broadcaster, attempt
//! ledger, job runner and the dispatch coordinator, all behind one
//! `Arc<ServerState>` shared by the HTTP handlers and the realtime layer.

use parking_lot::Mutex;
use shared::dispatch::JobKind;
use shared::realtime::ServerEvent;
use shared::util::now_millis;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::JwtService;
use crate::common::logger::cleanup_old_logs;
use crate::dispatch::{
    AttemptLedger, DispatchCommand, DispatchCoordinator, PartnerAvailability,
};
use crate::jobs::{JobError, JobRunner, TokioJobRunner};
use crate::lifecycle::{LifecycleMachine, MemoryOrderStore, OrderStore};
use crate::realtime::Broadcaster;

use super::config::Config;
use super::tasks::{BackgroundTasks, TaskKind};

/// Inbox depth for the dispatch coordinator
const DISPATCH_INBOX_CAPACITY: usize = 256;

pub struct ServerState {
    pub config: Config,
    pub store: Arc<dyn OrderStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub machine: Arc<LifecycleMachine>,
    pub ledger: Arc<AttemptLedger>,
    pub jobs: Arc<TokioJobRunner>,
    pub jwt: Arc<JwtService>,
    /// Sender into the dispatch coordinator's inbox
    pub dispatch_tx: mpsc::Sender<DispatchCommand>,
    /// Process start, for the health endpoint (millis)
    pub started_at: i64,
    /// Coordinator pieces held until `start_background_tasks` claims them
    coordinator: Mutex<Option<(Arc<DispatchCoordinator>, mpsc::Receiver<DispatchCommand>)>>,
}

impl ServerState {
    /// Build and wire all components. Background tasks are registered
    /// separately via [`Self::start_background_tasks`].
    pub fn initialize(
        config: Config,
        availability: Arc<dyn PartnerAvailability>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let ledger = Arc::new(AttemptLedger::new());
        let jwt = Arc::new(JwtService::new(config.jwt.clone()));

        let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_INBOX_CAPACITY);

        let machine = Arc::new(LifecycleMachine::new(
            store.clone(),
            broadcaster.clone(),
            dispatch_tx.clone(),
        ));

        let jobs = Arc::new(TokioJobRunner::new(config.jobs.clone(), shutdown));

        // due retry jobs re-enter the coordinator through its own inbox
        let retry_tx = dispatch_tx.clone();
        jobs.register(JobKind::AssignmentRetry, move |job| {
            let retry_tx = retry_tx.clone();
            Box::pin(async move {
                retry_tx
                    .send(DispatchCommand::Retry { job })
                    .await
                    .map_err(|e| JobError::Handler(e.to_string()))
            })
        });

        // a retry job the runner cannot deliver means the order would
        // silently stall; tell the operators instead
        let alert_broadcaster = broadcaster.clone();
        jobs.on_exhausted(move |job| {
            alert_broadcaster.alert_operators(&ServerEvent::DispatchAlert {
                order_id: job.order_id.clone(),
                message: "retry job could not be delivered".to_string(),
                job: Some(job.clone()),
            });
        });

        let coordinator = Arc::new(DispatchCoordinator::new(
            store.clone(),
            machine.clone(),
            broadcaster.clone(),
            availability,
            ledger.clone(),
            jobs.clone() as Arc<dyn JobRunner>,
            config.dispatch.clone(),
            dispatch_tx.clone(),
        ));

        Arc::new(Self {
            config,
            store,
            broadcaster,
            machine,
            ledger,
            jobs,
            jwt,
            dispatch_tx,
            started_at: now_millis(),
            coordinator: Mutex::new(Some((coordinator, dispatch_rx))),
        })
    }

    /// Register the engine's long-running tasks
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let Some((coordinator, rx)) = self.coordinator.lock().take() else {
            tracing::warn!("Background tasks already started");
            return;
        };

        tasks.spawn(
            "dispatch-coordinator",
            TaskKind::Worker,
            coordinator.run(rx, tasks.shutdown_token()),
        );

        let work_dir = self.config.work_dir.clone();
        let shutdown = tasks.shutdown_token();
        tasks.spawn("log-cleanup", TaskKind::Periodic, async move {
            let log_dir = std::path::Path::new(&work_dir).join("logs");
            loop {
                if let Err(e) = cleanup_old_logs(&log_dir) {
                    tracing::warn!(error = %e, "Log cleanup failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    pub fn uptime_secs(&self) -> i64 {
        (now_millis() - self.started_at) / 1000
    }
}
