//! HTTP API - 路由与处理器
//!
//! All routes return the unified `AppResponse` envelope. Authentication
//! is a bearer token on every `/api` route and a `token` query parameter
//! on the realtime handshake.

mod health;
mod orders;

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;
use crate::realtime::ws_handler;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/orders", post(orders::place_order))
        .route("/api/orders/{order_id}", get(orders::get_order))
        .route("/api/orders/{order_id}/transition", post(orders::transition_order))
        .route("/api/orders/{order_id}/intervene", post(orders::intervene_order))
        .route("/api/orders/{order_id}/attempts", get(orders::list_attempts))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
