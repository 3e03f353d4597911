//! 订单状态机
//!
//! 所有状态写入的唯一入口。每次转换按固定顺序执行副作用：
//!
//! 1. persist   - compare-and-set against the caller's expected status
//! 2. broadcast - `order:status` to the interested rooms (best-effort)
//! 3. dispatch  - notify the coordinator when the order becomes ready
//!    for pickup or reaches a terminal status
//!
//! Broadcast failure never rolls a committed transition back.
//!
//! Broadcasts from concurrent callers may interleave; every `order:status`
//! event carries the record's commit sequence so recipients can drop the
//! older one.

use shared::order::{DispatchState, OrderRecord, OrderStatus, OverrideRecord};
use shared::realtime::ServerEvent;
use shared::types::Actor;
use shared::util::now_millis;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::dispatch::DispatchCommand;
use crate::realtime::{subject_room, Broadcaster};
use shared::types::Role;

use super::error::TransitionError;
use super::store::{CasOutcome, OrderStore};

/// One requested status transition
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub order_id: String,
    /// Status the caller last observed; the commit fails if the persisted
    /// status moved on in the meantime
    pub expected: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
}

pub struct LifecycleMachine {
    store: Arc<dyn OrderStore>,
    broadcaster: Arc<Broadcaster>,
    dispatch_tx: mpsc::Sender<DispatchCommand>,
}

impl LifecycleMachine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        broadcaster: Arc<Broadcaster>,
        dispatch_tx: mpsc::Sender<DispatchCommand>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            dispatch_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Create a freshly placed order and announce it to the restaurant
    pub async fn place(
        &self,
        customer_id: &str,
        restaurant_id: &str,
        delivery_address_id: &str,
        subtotal: f64,
        delivery_fee: f64,
    ) -> Result<OrderRecord, TransitionError> {
        let order_id = uuid::Uuid::new_v4().to_string();
        let record = OrderRecord::new(
            order_id,
            customer_id,
            restaurant_id,
            delivery_address_id,
            subtotal,
            delivery_fee,
        );
        self.store.insert(record.clone()).await?;

        tracing::info!(
            order_id = %record.order_id,
            order_number = %record.order_number,
            customer_id = %record.customer_id,
            restaurant_id = %record.restaurant_id,
            total = record.total,
            "Order placed"
        );

        self.broadcaster.emit_to_room(
            &subject_room(Role::Restaurant, restaurant_id),
            &ServerEvent::OrderNew {
                order: record.clone(),
            },
        );
        Ok(record)
    }

    /// Validate and commit one transition, then run the side effects
    pub async fn transition(
        &self,
        req: TransitionRequest,
    ) -> Result<OrderRecord, TransitionError> {
        if !req.expected.can_transition_to(req.to) {
            tracing::warn!(
                order_id = %req.order_id,
                from = %req.expected,
                to = %req.to,
                actor = %req.actor.id,
                "Illegal transition rejected"
            );
            return Err(TransitionError::IllegalTransition {
                from: req.expected,
                to: req.to,
            });
        }

        let at = now_millis();
        let record = match self
            .store
            .compare_and_set_status(&req.order_id, req.expected, req.to, at)
            .await?
        {
            CasOutcome::Updated(record) => record,
            CasOutcome::Stale { actual } => {
                tracing::warn!(
                    order_id = %req.order_id,
                    expected = %req.expected,
                    actual = %actual,
                    to = %req.to,
                    "Stale transition rejected"
                );
                return Err(TransitionError::StaleState {
                    expected: req.expected,
                    actual,
                });
            }
        };

        tracing::info!(
            order_id = %record.order_id,
            from = %req.expected,
            to = %req.to,
            actor = %req.actor.id,
            actor_role = %req.actor.role,
            "Order transitioned"
        );

        let record = self.clear_escalation(record).await;
        self.announce(&record, false, at);
        self.notify_dispatch(&record).await;
        Ok(record)
    }

    /// Operator override: force a status outside the legal-edge table and
    /// record the act in the audit trail.
    pub async fn intervene(
        &self,
        order_id: &str,
        to: OrderStatus,
        reason: &str,
        operator_id: &str,
    ) -> Result<OrderRecord, TransitionError> {
        let current = self.store.get(order_id).await?;
        let at = now_millis();
        let record = self
            .store
            .apply_override(
                order_id,
                OverrideRecord {
                    operator_id: operator_id.to_string(),
                    reason: reason.to_string(),
                    from: current.status,
                    to,
                    at,
                },
            )
            .await?;

        tracing::warn!(
            order_id = %order_id,
            from = %current.status,
            to = %to,
            operator_id = %operator_id,
            reason = %reason,
            "Admin override applied"
        );

        let record = self.clear_escalation(record).await;
        self.announce(&record, true, at);
        self.notify_dispatch(&record).await;
        Ok(record)
    }

    /// An escalated order that leaves the searchable pool no longer needs
    /// a manual assignment; drop the flag so pollers see the real state.
    async fn clear_escalation(&self, record: OrderRecord) -> OrderRecord {
        if record.dispatch_state != DispatchState::NeedsManualAssignment
            || record.status == OrderStatus::ReadyForPickup
        {
            return record;
        }
        match self
            .store
            .set_dispatch_state(&record.order_id, DispatchState::Idle)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(
                    order_id = %record.order_id,
                    error = %e,
                    "Failed to clear manual-assignment flag"
                );
                record
            }
        }
    }

    fn announce(&self, record: &OrderRecord, is_override: bool, at: i64) {
        self.broadcaster.broadcast_order(
            record,
            &ServerEvent::OrderStatus {
                order_id: record.order_id.clone(),
                status: record.status,
                seq: record.seq,
                timestamp: at,
                partner_id: record.delivery_partner_id.clone(),
                is_override,
            },
        );
    }

    async fn notify_dispatch(&self, record: &OrderRecord) {
        let command = if record.status == OrderStatus::ReadyForPickup {
            DispatchCommand::Start {
                order_id: record.order_id.clone(),
            }
        } else if record.status.is_terminal() {
            DispatchCommand::OrderClosed {
                order_id: record.order_id.clone(),
            }
        } else {
            return;
        };

        if self.dispatch_tx.send(command).await.is_err() {
            tracing::error!(
                order_id = %record.order_id,
                "Dispatch coordinator inbox closed"
            );
        }
    }
}
