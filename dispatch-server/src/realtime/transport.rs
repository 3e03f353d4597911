//! Session transport abstraction
//!
//! The broadcaster pushes events through [`SessionTransport`] without
//! knowing what carries them. The production implementation is a
//! [`ChannelTransport`] drained by the WebSocket writer task; tests use
//! the same type through [`memory_transport`].

use shared::realtime::ServerEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
#[error("session transport closed")]
pub struct TransportClosed;

/// Outbound leg of one connected session
///
/// `send` must never block; the broadcaster calls it while holding room
/// map guards.
pub trait SessionTransport: Send + Sync {
    fn send(&self, event: &ServerEvent) -> Result<(), TransportClosed>;
}

/// Transport backed by an unbounded channel
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { tx }
    }
}

impl SessionTransport for ChannelTransport {
    fn send(&self, event: &ServerEvent) -> Result<(), TransportClosed> {
        self.tx.send(event.clone()).map_err(|_| TransportClosed)
    }
}

/// In-memory transport pair for tests: events sent through the returned
/// transport arrive on the receiver.
pub fn memory_transport() -> (
    Arc<ChannelTransport>,
    mpsc::UnboundedReceiver<ServerEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelTransport::new(tx)), rx)
}
