//! WebSocket 接入
//!
//! `GET /ws?token=...` - the token is verified before the upgrade is
//! accepted; a bad token gets a plain 401, never a connection.
//!
//! Each connection runs two halves: a writer task draining the session's
//! event channel into the socket, and a read loop parsing client messages.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::realtime::{ClientMessage, ServerEvent};
use shared::types::Role;
use shared::util::now_millis;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::Claims;
use crate::common::AppError;
use crate::core::ServerState;
use crate::dispatch::DispatchCommand;

use super::order_room;
use super::transport::ChannelTransport;
use super::SessionIdentity;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Handshake authentication. Runs before the upgrade extractor, so an
/// unauthenticated request is answered with 401 and never upgraded.
pub struct WsAuth(pub Claims);

impl FromRequestParts<Arc<ServerState>> for WsAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<WsQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized)?;
        let claims = state.jwt.verify_token(&query.token).map_err(|e| {
            tracing::debug!(error = %e, "Realtime handshake rejected");
            AppError::InvalidToken
        })?;
        Ok(WsAuth(claims))
    }
}

pub async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    WsAuth(claims): WsAuth,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, claims, socket))
}

async fn handle_socket(state: Arc<ServerState>, claims: Claims, socket: WebSocket) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.broadcaster.connect(
        session_id.clone(),
        SessionIdentity {
            subject_id: claims.sub.clone(),
            role: claims.role,
        },
        Arc::new(ChannelTransport::new(event_tx)),
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(event = event.name(), error = %e, "Event serialization failed");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &session_id, &claims, msg).await,
                Err(e) => {
                    tracing::debug!(
                        session_id = %session_id,
                        error = %e,
                        "Unparseable client message dropped"
                    );
                }
            },
            Message::Close(_) => break,
            // ping/pong handled by axum
            _ => {}
        }
    }

    state.broadcaster.disconnect(&session_id);
    writer.abort();
}

async fn handle_client_message(
    state: &Arc<ServerState>,
    session_id: &str,
    claims: &Claims,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Track { order_id } => {
            state.broadcaster.join(session_id, &order_room(&order_id));
        }

        ClientMessage::Untrack { order_id } => {
            state.broadcaster.leave(session_id, &order_room(&order_id));
        }

        ClientMessage::OfferAnswer {
            order_id,
            attempt,
            accept,
        } => {
            if claims.role != Role::Partner {
                tracing::warn!(
                    session_id = %session_id,
                    subject_id = %claims.sub,
                    role = %claims.role,
                    "Offer answer from non-partner dropped"
                );
                return;
            }
            let command = DispatchCommand::Answer {
                order_id,
                partner_id: claims.sub.clone(),
                attempt,
                accept,
            };
            if state.dispatch_tx.send(command).await.is_err() {
                tracing::error!(session_id = %session_id, "Dispatch coordinator inbox closed");
            }
        }

        ClientMessage::Location { order_id, lat, lng } => {
            if claims.role != Role::Partner {
                return;
            }
            state.broadcaster.emit_to_room(
                &order_room(&order_id),
                &ServerEvent::DeliveryLocation {
                    order_id,
                    partner_id: claims.sub.clone(),
                    lat,
                    lng,
                    timestamp: now_millis(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BackgroundTasks, Config};
    use crate::dispatch::StaticAvailability;
    use crate::realtime::{memory_transport, SessionIdentity};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_util::sync::CancellationToken;

    fn state() -> Arc<ServerState> {
        ServerState::initialize(
            Config::from_env(),
            Arc::new(StaticAvailability::fixed(vec![])),
            CancellationToken::new(),
        )
    }

    fn claims(subject: &str, role: Role) -> Claims {
        Claims {
            sub: subject.to_string(),
            role,
            iat: 0,
            exp: i64::MAX,
            iss: "dispatch-server".to_string(),
        }
    }

    fn session(
        state: &Arc<ServerState>,
        session_id: &str,
        subject_id: &str,
        role: Role,
    ) -> UnboundedReceiver<ServerEvent> {
        let (transport, rx) = memory_transport();
        state.broadcaster.connect(
            session_id,
            SessionIdentity {
                subject_id: subject_id.to_string(),
                role,
            },
            transport,
        );
        rx
    }

    #[tokio::test]
    async fn track_and_untrack_manage_the_order_room() {
        let state = state();
        let mut rx = session(&state, "s-1", "c-1", Role::Customer);
        let c = claims("c-1", Role::Customer);
        let room = order_room("o-1");

        handle_client_message(
            &state,
            "s-1",
            &c,
            ClientMessage::Track {
                order_id: "o-1".to_string(),
            },
        )
        .await;
        state.broadcaster.emit_to_room(
            &room,
            &ServerEvent::DeliveryReassigned {
                order_id: "o-1".to_string(),
            },
        );
        assert!(rx.try_recv().is_ok());

        handle_client_message(
            &state,
            "s-1",
            &c,
            ClientMessage::Untrack {
                order_id: "o-1".to_string(),
            },
        )
        .await;
        state.broadcaster.emit_to_room(
            &room,
            &ServerEvent::DeliveryReassigned {
                order_id: "o-1".to_string(),
            },
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn partner_offer_answer_reaches_the_coordinator() {
        let state = state();
        let mut tasks = BackgroundTasks::new();
        state.start_background_tasks(&mut tasks);

        let mut partner = session(&state, "s-p", "p-1", Role::Partner);
        handle_client_message(
            &state,
            "s-p",
            &claims("p-1", Role::Partner),
            ClientMessage::OfferAnswer {
                order_id: "o-1".to_string(),
                attempt: 1,
                accept: true,
            },
        )
        .await;

        // no search is running for o-1; the coordinator tells the sender
        // the offer is gone, proving the answer arrived under its id
        let event = tokio::time::timeout(Duration::from_secs(1), partner.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ServerEvent::DeliveryReassigned { .. }));
    }

    #[tokio::test]
    async fn offer_answer_from_non_partner_is_dropped() {
        let state = state();
        let mut tasks = BackgroundTasks::new();
        state.start_background_tasks(&mut tasks);

        // a forwarded answer for c-1 would bounce back on this channel
        let mut partner_channel = session(&state, "s-p", "c-1", Role::Partner);
        handle_client_message(
            &state,
            "s-c",
            &claims("c-1", Role::Customer),
            ClientMessage::OfferAnswer {
                order_id: "o-1".to_string(),
                attempt: 1,
                accept: true,
            },
        )
        .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(partner_channel.try_recv().is_err());
    }

    #[tokio::test]
    async fn location_passes_through_for_partners_only() {
        let state = state();
        let mut tracker = session(&state, "s-t", "c-9", Role::Customer);
        state.broadcaster.join("s-t", &order_room("o-1"));

        let msg = ClientMessage::Location {
            order_id: "o-1".to_string(),
            lat: 1.5,
            lng: 2.5,
        };
        handle_client_message(&state, "s-c", &claims("c-1", Role::Customer), msg.clone()).await;
        assert!(tracker.try_recv().is_err());

        handle_client_message(&state, "s-p", &claims("p-1", Role::Partner), msg).await;
        match tracker.try_recv().unwrap() {
            ServerEvent::DeliveryLocation {
                order_id,
                partner_id,
                lat,
                ..
            } => {
                assert_eq!(order_id, "o-1");
                assert_eq!(partner_id, "p-1");
                assert_eq!(lat, 1.5);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
