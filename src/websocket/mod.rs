//! Live channel: who is online, and what travels over the socket.

pub mod events;
pub mod message_types;

use crate::error::AppError;
use crate::services::delivery::Notifier;
use events::ServerEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Identity of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound side of a connection: serialized events queued for the socket
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: UnboundedSender<String>,
}

impl ConnectionHandle {
    /// Serializes and queues one event for this connection
    pub fn send_event(&self, event: &ServerEvent) -> Result<(), AppError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::Transport(format!("serialize {}: {e}", event.event_type())))?;
        self.sender
            .send(payload)
            .map_err(|_| AppError::Transport(format!("connection {} closed", self.id)))
    }

    /// Creates a handle and the receiver its socket drains
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                sender: tx,
            },
            rx,
        )
    }
}

#[derive(Default)]
struct Presence {
    by_user: HashMap<Uuid, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, Uuid>,
}

/// Process-wide map from user to their single active connection.
///
/// Empty at startup and cleared on shutdown. A later `join` for the same user
/// replaces the earlier connection; `leave` only removes the entry when it
/// still points at the leaving connection.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<Presence>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, user_id: Uuid, handle: ConnectionHandle) {
        let mut guard = self.inner.write();
        let connection_id = handle.id;

        if let Some(previous) = guard.by_user.insert(user_id, handle) {
            if previous.id != connection_id {
                guard.by_connection.remove(&previous.id);
                tracing::debug!(
                    user_id = %user_id,
                    replaced = %previous.id,
                    "presence entry replaced by newer connection"
                );
            }
        }
        guard.by_connection.insert(connection_id, user_id);

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            online = guard.by_user.len(),
            "user joined"
        );
    }

    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.read().by_user.get(&user_id).cloned()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().by_user.contains_key(&user_id)
    }

    /// Drops the entry held by `connection_id`, if any. Returns the user it belonged to.
    pub fn leave(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let mut guard = self.inner.write();
        let user_id = guard.by_connection.remove(&connection_id)?;

        let owns_entry = guard
            .by_user
            .get(&user_id)
            .map(|h| h.id == connection_id)
            .unwrap_or(false);
        if owns_entry {
            guard.by_user.remove(&user_id);
        }

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            online = guard.by_user.len(),
            "user left"
        );
        Some(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every handle; their sockets see the channel close
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        let dropped = guard.by_user.len();
        guard.by_user.clear();
        guard.by_connection.clear();
        tracing::info!(dropped, "presence registry cleared");
    }
}

impl Notifier for PresenceRegistry {
    fn connection_of(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.inner.read().by_user.get(&user_id).map(|h| h.id)
    }

    fn push(&self, connection_id: ConnectionId, event: &ServerEvent) -> Result<(), AppError> {
        let handle = {
            let guard = self.inner.read();
            guard
                .by_connection
                .get(&connection_id)
                .and_then(|user| guard.by_user.get(user))
                .filter(|h| h.id == connection_id)
                .cloned()
        };

        // A closed channel means the socket task stopped; its stop hook calls leave()
        handle
            .ok_or_else(|| AppError::Transport(format!("connection {connection_id} is gone")))?
            .send_event(event)
    }
}
