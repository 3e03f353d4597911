//! Room-scoped event broadcaster
//!
//! 房间模型:
//!
//! - `order:{id}`      - anyone tracking one order
//! - `customer:{id}`   - a customer's private channel
//! - `restaurant:{id}` - a restaurant's private channel
//! - `partner:{id}`    - a delivery partner's private channel
//! - `role:{role}`     - all sessions of one role (operator alerts)
//!
//! A session auto-joins its subject and role channels at connect time and
//! may track/untrack order rooms afterwards. Fan-out to the rooms of one
//! event is deduplicated: a session in several matching rooms receives the
//! event once.

use dashmap::DashMap;
use shared::order::OrderRecord;
use shared::realtime::ServerEvent;
use shared::types::Role;
use std::collections::HashSet;
use std::sync::Arc;

use super::transport::SessionTransport;
use super::{order_room, role_room, subject_room};

/// Authenticated identity of one connected session
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub subject_id: String,
    pub role: Role,
}

struct SessionEntry {
    identity: SessionIdentity,
    transport: Arc<dyn SessionTransport>,
}

/// Session registry and room-based fan-out
pub struct Broadcaster {
    /// session_id -> session
    sessions: DashMap<String, SessionEntry>,
    /// room -> session_ids
    rooms: DashMap<String, HashSet<String>>,
    /// session_id -> rooms joined (reverse index for disconnect)
    memberships: DashMap<String, HashSet<String>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Register a session and auto-join its subject and role channels
    pub fn connect(
        &self,
        session_id: impl Into<String>,
        identity: SessionIdentity,
        transport: Arc<dyn SessionTransport>,
    ) {
        let session_id = session_id.into();
        let subject = subject_room(identity.role, &identity.subject_id);
        let role = role_room(identity.role);

        tracing::info!(
            session_id = %session_id,
            subject_id = %identity.subject_id,
            role = %identity.role,
            "Session connected"
        );

        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                identity,
                transport,
            },
        );
        self.join(&session_id, &subject);
        self.join(&session_id, &role);
    }

    /// Drop a session and all its room memberships
    pub fn disconnect(&self, session_id: &str) {
        if let Some((_, joined)) = self.memberships.remove(session_id) {
            for room in joined {
                if let Some(mut members) = self.rooms.get_mut(&room) {
                    members.remove(session_id);
                    if members.is_empty() {
                        drop(members);
                        self.rooms.remove_if(&room, |_, m| m.is_empty());
                    }
                }
            }
        }
        if self.sessions.remove(session_id).is_some() {
            tracing::info!(session_id = %session_id, "Session disconnected");
        }
    }

    pub fn join(&self, session_id: &str, room: &str) {
        if !self.sessions.contains_key(session_id) {
            return;
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(session_id.to_string());
        self.memberships
            .entry(session_id.to_string())
            .or_default()
            .insert(room.to_string());
        tracing::debug!(session_id = %session_id, room = %room, "Joined room");
    }

    pub fn leave(&self, session_id: &str, room: &str) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(session_id);
        }
        if let Some(mut joined) = self.memberships.get_mut(session_id) {
            joined.remove(room);
        }
        tracing::debug!(session_id = %session_id, room = %room, "Left room");
    }

    /// Identity of a connected session, if still registered
    pub fn identity_of(&self, session_id: &str) -> Option<SessionIdentity> {
        self.sessions.get(session_id).map(|s| s.identity.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Deliver an event to every session in one room. Returns the number
    /// of sessions reached; send failures are logged and skipped.
    pub fn emit_to_room(&self, room: &str, event: &ServerEvent) -> usize {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(m) => m.iter().cloned().collect(),
            None => return 0,
        };
        self.deliver(&members, event)
    }

    /// Fan an order event out to every room interested in the order:
    /// the tracking room, the customer, the restaurant, and the assigned
    /// partner if any. Each session receives the event at most once.
    pub fn broadcast_order(&self, record: &OrderRecord, event: &ServerEvent) -> usize {
        let mut rooms = vec![
            order_room(&record.order_id),
            subject_room(Role::Customer, &record.customer_id),
            subject_room(Role::Restaurant, &record.restaurant_id),
        ];
        if let Some(partner_id) = &record.delivery_partner_id {
            rooms.push(subject_room(Role::Partner, partner_id));
        }

        let mut targets: HashSet<String> = HashSet::new();
        for room in &rooms {
            if let Some(members) = self.rooms.get(room) {
                targets.extend(members.iter().cloned());
            }
        }
        let targets: Vec<String> = targets.into_iter().collect();
        let delivered = self.deliver(&targets, event);
        tracing::debug!(
            order_id = %record.order_id,
            event = event.name(),
            delivered,
            "Order event broadcast"
        );
        delivered
    }

    /// Targeted delivery to one partner's private channel
    pub fn send_to_partner(&self, partner_id: &str, event: &ServerEvent) -> usize {
        self.emit_to_room(&subject_room(Role::Partner, partner_id), event)
    }

    /// High-priority alert to every connected operator
    pub fn alert_operators(&self, event: &ServerEvent) -> usize {
        let delivered = self.emit_to_room(&role_room(Role::Operator), event);
        if delivered == 0 {
            tracing::warn!(event = event.name(), "Operator alert had no recipients");
        }
        delivered
    }

    fn deliver(&self, session_ids: &[String], event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for session_id in session_ids {
            let Some(session) = self.sessions.get(session_id) else {
                continue;
            };
            match session.transport.send(event) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(
                        session_id = %session_id,
                        event = event.name(),
                        "Dropping event for closed session"
                    );
                }
            }
        }
        delivered
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
