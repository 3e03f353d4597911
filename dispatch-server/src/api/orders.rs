//! 订单接口
//!
//! - `POST /api/orders`                      下单 (customer)
//! - `GET  /api/orders/{id}`                 查询订单
//! - `POST /api/orders/{id}/transition`      请求状态转换
//! - `POST /api/orders/{id}/intervene`       管理员强制转换 (operator)
//! - `GET  /api/orders/{id}/attempts`        派单历史

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use shared::dispatch::AssignmentAttempt;
use shared::order::{OrderRecord, OrderStatus};
use shared::types::{Actor, Role};
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::common::{AppError, AppResponse, AppResult, ok};
use crate::core::ServerState;
use crate::lifecycle::TransitionRequest;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub restaurant_id: String,
    pub delivery_address_id: String,
    pub subtotal: f64,
    #[serde(default)]
    pub delivery_fee: f64,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    /// Status the caller last observed
    pub expected: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct InterveneBody {
    pub to: OrderStatus,
    pub reason: String,
}

pub async fn place_order(
    State(state): State<Arc<ServerState>>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<PlaceOrderRequest>,
) -> AppResult<Json<AppResponse<OrderRecord>>> {
    if claims.role != Role::Customer {
        return Err(AppError::forbidden("Only customers can place orders"));
    }
    if body.restaurant_id.is_empty() || body.delivery_address_id.is_empty() {
        return Err(AppError::validation("restaurant_id and delivery_address_id are required"));
    }
    if body.subtotal <= 0.0 || body.delivery_fee < 0.0 {
        return Err(AppError::validation("amounts must be positive"));
    }

    let record = state
        .machine
        .place(
            &claims.sub,
            &body.restaurant_id,
            &body.delivery_address_id,
            body.subtotal,
            body.delivery_fee,
        )
        .await?;
    Ok(ok(record))
}

pub async fn get_order(
    State(state): State<Arc<ServerState>>,
    CurrentUser(_claims): CurrentUser,
    Path(order_id): Path<String>,
) -> AppResult<Json<AppResponse<OrderRecord>>> {
    let record = state.store.get(&order_id).await?;
    Ok(ok(record))
}

pub async fn transition_order(
    State(state): State<Arc<ServerState>>,
    CurrentUser(claims): CurrentUser,
    Path(order_id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> AppResult<Json<AppResponse<OrderRecord>>> {
    let record = state
        .machine
        .transition(TransitionRequest {
            order_id,
            expected: body.expected,
            to: body.to,
            actor: Actor::new(claims.sub, claims.role),
        })
        .await?;
    Ok(ok(record))
}

pub async fn intervene_order(
    State(state): State<Arc<ServerState>>,
    CurrentUser(claims): CurrentUser,
    Path(order_id): Path<String>,
    Json(body): Json<InterveneBody>,
) -> AppResult<Json<AppResponse<OrderRecord>>> {
    if claims.role != Role::Operator {
        return Err(AppError::forbidden("Only operators can intervene"));
    }
    if body.reason.trim().is_empty() {
        return Err(AppError::validation("A reason is required for overrides"));
    }

    let record = state
        .machine
        .intervene(&order_id, body.to, &body.reason, &claims.sub)
        .await?;
    Ok(ok(record))
}

pub async fn list_attempts(
    State(state): State<Arc<ServerState>>,
    CurrentUser(_claims): CurrentUser,
    Path(order_id): Path<String>,
) -> AppResult<Json<AppResponse<Vec<AssignmentAttempt>>>> {
    // surface a 404 for unknown orders rather than an empty history
    state.store.get(&order_id).await?;
    Ok(ok(state.ledger.list(&order_id)))
}
