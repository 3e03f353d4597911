use axum::Json;
use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;

use crate::common::{AppResponse, ok};
use crate::core::ServerState;

#[derive(Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub environment: String,
    pub uptime_secs: i64,
    pub sessions: usize,
}

pub async fn health(State(state): State<Arc<ServerState>>) -> Json<AppResponse<HealthInfo>> {
    ok(HealthInfo {
        status: "ok",
        environment: state.config.environment.clone(),
        uptime_secs: state.uptime_secs(),
        sessions: state.broadcaster.session_count(),
    })
}
