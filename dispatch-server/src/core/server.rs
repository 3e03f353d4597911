//! HTTP 服务器
//!
//! Owns startup order: state wiring, background tasks, then the axum
//! listener with graceful shutdown on Ctrl-C. Shutdown drains background
//! tasks before the process exits.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::dispatch::{PartnerAvailability, StaticAvailability};

use super::config::Config;
use super::error::Result;
use super::state::ServerState;
use super::tasks::BackgroundTasks;

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let mut tasks = BackgroundTasks::new();
        let availability = availability_from_env();
        let state = ServerState::initialize(self.config.clone(), availability, tasks.shutdown_token());

        state.start_background_tasks(&mut tasks);
        tasks.log_summary();

        let router = api::router(state.clone());

        let addr = format!("0.0.0.0:{}", self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        tracing::info!(
            addr = %addr,
            environment = %self.config.environment,
            "Dispatch server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(tasks.shutdown_token()))
            .await
            .context("http server error")?;

        tasks.shutdown().await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Candidate source for standalone runs: `AVAILABLE_PARTNERS` is a
/// comma-separated partner id list offered on every search round. A real
/// deployment plugs a service-backed [`PartnerAvailability`] in here.
fn availability_from_env() -> Arc<dyn PartnerAvailability> {
    let partners: Vec<String> = std::env::var("AVAILABLE_PARTNERS")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if partners.is_empty() {
        tracing::warn!("AVAILABLE_PARTNERS not set, every search round will be empty");
    }
    Arc::new(StaticAvailability::fixed(partners))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
}
