//! Tokio-backed job runner
//!
//! Each enqueued job becomes one spawned task: sleep until the job is due,
//! run the registered handler, retry on failure up to `max_attempts` with
//! a fixed delay. A job that exhausts its attempts fires the exhaustion
//! hook so a human hears about it.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use shared::dispatch::{JobKind, RetryJob};
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::JobConfig;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("no handler registered for {0:?}")]
    NoHandler(JobKind),

    #[error("job handler failed: {0}")]
    Handler(String),

    #[error("runner is shut down")]
    Shutdown,
}

/// Async handler for one job kind
pub type JobHandler =
    Arc<dyn Fn(RetryJob) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// Hook invoked when a job burns all its infrastructure attempts
pub type ExhaustedHook = Arc<dyn Fn(&RetryJob) + Send + Sync>;

/// Deferred-work scheduler (external collaborator seam)
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Schedule a job; returns the job id
    async fn enqueue(&self, job: RetryJob) -> Result<String, JobError>;
}

pub struct TokioJobRunner {
    handlers: DashMap<JobKind, JobHandler>,
    exhausted: RwLock<Option<ExhaustedHook>>,
    config: JobConfig,
    shutdown: CancellationToken,
}

impl TokioJobRunner {
    pub fn new(config: JobConfig, shutdown: CancellationToken) -> Self {
        Self {
            handlers: DashMap::new(),
            exhausted: RwLock::new(None),
            config,
            shutdown,
        }
    }

    /// Register the handler for one job kind, replacing any previous one
    pub fn register<F>(&self, kind: JobKind, handler: F)
    where
        F: Fn(RetryJob) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
    }

    /// Set the hook called after a job exhausts its attempts
    pub fn on_exhausted<F>(&self, hook: F)
    where
        F: Fn(&RetryJob) + Send + Sync + 'static,
    {
        *self.exhausted.write() = Some(Arc::new(hook));
    }

    async fn run_job(
        job_id: String,
        job: RetryJob,
        handler: JobHandler,
        config: JobConfig,
        exhausted: Option<ExhaustedHook>,
        shutdown: CancellationToken,
    ) {
        let wait = job.run_after.saturating_sub(now_millis()).max(0) as u64;
        if wait > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
                _ = shutdown.cancelled() => {
                    tracing::debug!(job_id = %job_id, "Job dropped at shutdown");
                    return;
                }
            }
        }

        for attempt in 1..=config.max_attempts {
            if shutdown.is_cancelled() {
                tracing::debug!(job_id = %job_id, "Job dropped at shutdown");
                return;
            }
            match handler(job.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        job_id = %job_id,
                        order_id = %job.order_id,
                        kind = ?job.kind,
                        attempt,
                        "Job completed"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        order_id = %job.order_id,
                        kind = ?job.kind,
                        attempt,
                        error = %e,
                        "Job attempt failed"
                    );
                    if attempt < config.max_attempts {
                        tokio::time::sleep(config.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!(
            job_id = %job_id,
            order_id = %job.order_id,
            kind = ?job.kind,
            attempts = config.max_attempts,
            "Job exhausted all attempts"
        );
        if let Some(hook) = exhausted {
            hook(&job);
        }
    }
}

#[async_trait]
impl JobRunner for TokioJobRunner {
    async fn enqueue(&self, job: RetryJob) -> Result<String, JobError> {
        if self.shutdown.is_cancelled() {
            return Err(JobError::Shutdown);
        }
        let handler = self
            .handlers
            .get(&job.kind)
            .map(|h| h.clone())
            .ok_or(JobError::NoHandler(job.kind))?;

        let job_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            job_id = %job_id,
            order_id = %job.order_id,
            kind = ?job.kind,
            run_after = job.run_after,
            round = job.round,
            "Job enqueued"
        );

        let exhausted = self.exhausted.read().clone();
        tokio::spawn(Self::run_job(
            job_id.clone(),
            job,
            handler,
            self.config.clone(),
            exhausted,
            self.shutdown.clone(),
        ));
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> JobConfig {
        JobConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    fn due_now(round: u32) -> RetryJob {
        RetryJob {
            order_id: "o-1".to_string(),
            kind: JobKind::AssignmentRetry,
            run_after: now_millis(),
            round,
        }
    }

    #[tokio::test]
    async fn runs_handler_when_due() {
        let runner = TokioJobRunner::new(fast_config(), CancellationToken::new());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        runner.register(JobKind::AssignmentRetry, move |_job| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        runner.enqueue(due_now(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waits_until_run_after() {
        let runner = TokioJobRunner::new(fast_config(), CancellationToken::new());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        runner.register(JobKind::AssignmentRetry, move |_job| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let job = RetryJob {
            run_after: now_millis() + 80,
            ..due_now(1)
        };
        runner.enqueue(job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let runner = TokioJobRunner::new(fast_config(), CancellationToken::new());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        runner.register(JobKind::AssignmentRetry, move |_job| {
            let counter = counter.clone();
            Box::pin(async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(JobError::Handler("transient".to_string()))
                } else {
                    Ok(())
                }
            })
        });

        runner.enqueue(due_now(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_and_fires_hook() {
        let runner = TokioJobRunner::new(fast_config(), CancellationToken::new());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        runner.register(JobKind::AssignmentRetry, move |_job| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JobError::Handler("down".to_string()))
            })
        });
        let escalated = Arc::new(AtomicU32::new(0));
        let flag = escalated.clone();
        runner.on_exhausted(move |_job| {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        runner.enqueue(due_now(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(escalated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_unregistered_kind() {
        let runner = TokioJobRunner::new(fast_config(), CancellationToken::new());
        let job = RetryJob {
            kind: JobKind::Reminder,
            ..due_now(1)
        };
        assert!(matches!(
            runner.enqueue(job).await,
            Err(JobError::NoHandler(JobKind::Reminder))
        ));
    }
}
