//! Delivery Engine: who hears about a change, and the status transitions that
//! live delivery implies.
//!
//! Pushes are best effort. A failed push is logged and dropped; the stored
//! record stays the source of truth and a later fetch recovers it.

use crate::error::AppError;
use crate::models::{DeliveryStatus, Message};
use crate::store::MessageStore;
use crate::websocket::events::ServerEvent;
use crate::websocket::ConnectionId;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Capability to reach a user's live connection
pub trait Notifier: Send + Sync {
    fn connection_of(&self, user_id: Uuid) -> Option<ConnectionId>;

    fn push(&self, connection_id: ConnectionId, event: &ServerEvent) -> Result<(), AppError>;

    /// Pushes to the user's connection if they are online. `Ok(false)` when absent.
    fn send(&self, user_id: Uuid, event: &ServerEvent) -> Result<bool, AppError> {
        match self.connection_of(user_id) {
            Some(connection_id) => self.push(connection_id, event).map(|_| true),
            None => Ok(false),
        }
    }
}

#[derive(Clone)]
pub struct DeliveryEngine {
    notifier: Arc<dyn Notifier>,
    messages: Arc<dyn MessageStore>,
}

impl DeliveryEngine {
    pub fn new(notifier: Arc<dyn Notifier>, messages: Arc<dyn MessageStore>) -> Self {
        Self { notifier, messages }
    }

    /// Fans a freshly persisted message out to both participants.
    ///
    /// When the receiver is online the stored status moves to `delivered`
    /// before the push, so nobody observes `sent` for it. The sender's own
    /// connection gets the same record (with its correlation token) unless it
    /// is the receiver's connection.
    pub async fn deliver_new(&self, message: Message) -> Message {
        let token = message.client_temp_id.clone();
        let receiver_conn = self.notifier.connection_of(message.receiver_id);
        let mut message = message;

        if let Some(conn) = receiver_conn {
            match self
                .messages
                .advance_status(message.id, DeliveryStatus::Delivered)
                .await
            {
                Ok(Some(updated)) => message = updated.with_client_temp_id(token),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    message_id = %message.id,
                    error = %e,
                    "could not record delivered status"
                ),
            }
            self.push(conn, &ServerEvent::ReceiveMessage(message.clone()));
        }

        if let Some(conn) = self.notifier.connection_of(message.sender_id) {
            if Some(conn) != receiver_conn {
                self.push(conn, &ServerEvent::ReceiveMessage(message.clone()));
            }
        }

        message
    }

    /// Edited body goes to the other participant
    pub fn announce_edit(&self, actor: Uuid, message: &Message) {
        self.notify(
            message.counterpart_of(actor),
            &ServerEvent::MessageEdited(message.clone()),
        );
    }

    pub fn announce_delete(&self, actor: Uuid, message: &Message) {
        self.notify(
            message.counterpart_of(actor),
            &ServerEvent::MessageDeleted(message.clone()),
        );
    }

    /// Reactions reach the counterpart and the reactor's own connection
    pub fn announce_reaction(&self, actor: Uuid, message: &Message) {
        let event = ServerEvent::ReceiveReaction(message.clone());
        let counterpart_conn = self.notifier.connection_of(message.counterpart_of(actor));

        if let Some(conn) = counterpart_conn {
            self.push(conn, &event);
        }
        if let Some(conn) = self.notifier.connection_of(actor) {
            if Some(conn) != counterpart_conn {
                self.push(conn, &event);
            }
        }
    }

    /// One `messageRead` per (sender, conversation) among the newly read messages
    pub fn announce_read(&self, reader: Uuid, newly_read: &[Message]) {
        let mut groups: BTreeMap<(Uuid, Uuid), Vec<Uuid>> = BTreeMap::new();
        for msg in newly_read.iter().filter(|m| m.sender_id != reader) {
            groups
                .entry((msg.sender_id, msg.conversation_id))
                .or_default()
                .push(msg.id);
        }

        for ((sender, conversation_id), message_ids) in groups {
            self.notify(
                sender,
                &ServerEvent::MessageRead {
                    reader_id: reader,
                    conversation_id,
                    message_ids,
                },
            );
        }
    }

    pub fn relay_typing(&self, from: Uuid, to: Uuid) {
        self.notify(to, &ServerEvent::Typing { sender_id: from });
    }

    fn notify(&self, user_id: Uuid, event: &ServerEvent) {
        match self.notifier.send(user_id, event) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                user_id = %user_id,
                event = event.event_type(),
                "recipient offline, skipping push"
            ),
            Err(e) => tracing::debug!(
                user_id = %user_id,
                event = event.event_type(),
                error = %e,
                "live push dropped"
            ),
        }
    }

    fn push(&self, connection_id: ConnectionId, event: &ServerEvent) {
        if let Err(e) = self.notifier.push(connection_id, event) {
            tracing::debug!(
                connection_id = %connection_id,
                event = event.event_type(),
                error = %e,
                "live push dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use crate::store::{ConversationStore, MemoryStore};
    use crate::websocket::{ConnectionHandle, PresenceRegistry};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    async fn setup() -> (DeliveryEngine, PresenceRegistry, Arc<MemoryStore>, Message) {
        let store = Arc::new(MemoryStore::new());
        let presence = PresenceRegistry::new();
        let engine = DeliveryEngine::new(Arc::new(presence.clone()), store.clone());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = store.get_or_create(a, b).await.unwrap();
        let msg = store
            .insert(NewMessage {
                conversation_id: conv.id,
                sender_id: a,
                receiver_id: b,
                body: Some("hello".into()),
                attachment_url: None,
                attachment_name: None,
                reply_to: None,
            })
            .await
            .unwrap();
        (engine, presence, store, msg)
    }

    #[tokio::test]
    async fn offline_receiver_keeps_sent_status() {
        let (engine, _presence, store, msg) = setup().await;
        let delivered = engine.deliver_new(msg.clone()).await;
        assert_eq!(delivered.status, DeliveryStatus::Sent);
        assert_eq!(
            store.get(msg.id).await.unwrap().unwrap().status,
            DeliveryStatus::Sent
        );
    }

    #[tokio::test]
    async fn online_receiver_sees_delivered_and_sender_gets_token() {
        let (engine, presence, store, msg) = setup().await;
        let (b_handle, mut b_rx) = ConnectionHandle::channel();
        let (a_handle, mut a_rx) = ConnectionHandle::channel();
        presence.join(msg.receiver_id, b_handle);
        presence.join(msg.sender_id, a_handle);

        let delivered = engine
            .deliver_new(msg.clone().with_client_temp_id(Some("t1".into())))
            .await;
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(
            store.get(msg.id).await.unwrap().unwrap().status,
            DeliveryStatus::Delivered
        );

        let b_frames = drain(&mut b_rx);
        assert_eq!(b_frames.len(), 1);
        assert_eq!(b_frames[0]["type"], "receiveMessage");
        assert_eq!(b_frames[0]["status"], "delivered");

        let a_frames = drain(&mut a_rx);
        assert_eq!(a_frames.len(), 1);
        assert_eq!(a_frames[0]["clientTempId"], "t1");
    }

    #[tokio::test]
    async fn read_receipts_group_by_sender_and_skip_offline() {
        let (engine, presence, _store, msg) = setup().await;
        let (a_handle, mut a_rx) = ConnectionHandle::channel();
        presence.join(msg.sender_id, a_handle);

        let mut second = msg.clone();
        second.id = Uuid::new_v4();
        engine.announce_read(msg.receiver_id, &[msg.clone(), second.clone()]);

        let frames = drain(&mut a_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "messageRead");
        assert_eq!(frames[0]["messageIds"].as_array().unwrap().len(), 2);

        // Nobody listening: must not panic or error
        presence.clear();
        engine.announce_read(msg.receiver_id, &[msg]);
    }

    #[tokio::test]
    async fn closed_socket_does_not_fail_delivery() {
        let (engine, presence, _store, msg) = setup().await;
        let (b_handle, b_rx) = ConnectionHandle::channel();
        presence.join(msg.receiver_id, b_handle);
        drop(b_rx);

        let delivered = engine.deliver_new(msg).await;
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
    }
}
