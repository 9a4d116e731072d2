//! Per-session outbound fanout

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Outbound channel capacity per session
pub const SESSION_BUFFER: usize = 64;

/// Fanout table mapping session ids to their outbound channels.
///
/// Delivery is at-most-once: a full or closed channel drops the message
/// and the sender moves on. Slow consumers lose frames instead of
/// stalling the relay.
#[derive(Default)]
pub struct BroadcastRouter {
    senders: HashMap<Uuid, mpsc::Sender<ServerMsg>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    /// Register the outbound channel for a newly connected session
    pub fn attach(&mut self, session_id: Uuid, sender: mpsc::Sender<ServerMsg>) {
        self.senders.insert(session_id, sender);
    }

    /// Drop a session's channel; safe to call twice
    pub fn detach(&mut self, session_id: &Uuid) {
        self.senders.remove(session_id);
    }

    /// Deliver to a single session
    pub fn send_to(&self, session_id: &Uuid, msg: ServerMsg) {
        if let Some(tx) = self.senders.get(session_id) {
            Self::try_deliver(session_id, tx, msg);
        }
    }

    /// Deliver to every session except the originating one
    pub fn to_others(&self, origin: &Uuid, msg: ServerMsg) {
        for (session_id, tx) in &self.senders {
            if session_id != origin {
                Self::try_deliver(session_id, tx, msg.clone());
            }
        }
    }

    /// Deliver to every connected session
    pub fn to_all(&self, msg: ServerMsg) {
        for (session_id, tx) in &self.senders {
            Self::try_deliver(session_id, tx, msg.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    fn try_deliver(session_id: &Uuid, tx: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
        if let Err(err) = tx.try_send(msg) {
            debug!(session_id = %session_id, error = %err, "Dropped outbound message");
        }
    }
}
