//! Message lifecycle: send, edit, delete, react and read receipts.
//!
//! Every operation validates and persists first; live pushes happen only
//! after the store accepted the change.

use crate::error::{AppError, AppResult};
use crate::models::{InboxEntry, Message, NewMessage, Reaction, ReadScope};
use crate::services::conversation_service::ConversationService;
use crate::services::delivery::DeliveryEngine;
use crate::store::MessageStore;
use std::sync::Arc;
use uuid::Uuid;

const MAX_EMOJI_LEN: usize = 20;

/// Input to [`MessageService::send`]. `sender` always comes from the
/// authenticated session.
#[derive(Debug, Clone, Default)]
pub struct SendMessageRequest {
    pub sender: Uuid,
    pub receiver: Uuid,
    pub conversation_id: Option<Uuid>,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub reply_to: Option<Uuid>,
    pub client_temp_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Clone)]
pub struct MessageService {
    conversations: ConversationService,
    messages: Arc<dyn MessageStore>,
    delivery: DeliveryEngine,
}

impl MessageService {
    pub fn new(
        conversations: ConversationService,
        messages: Arc<dyn MessageStore>,
        delivery: DeliveryEngine,
    ) -> Self {
        Self {
            conversations,
            messages,
            delivery,
        }
    }

    pub fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    pub async fn send(&self, req: SendMessageRequest) -> AppResult<Message> {
        let body = non_blank(req.body);
        let attachment_url = non_blank(req.attachment_url);
        if body.is_none() && attachment_url.is_none() {
            return Err(AppError::validation("Message or file is required"));
        }
        if req.sender == req.receiver {
            return Err(AppError::validation("Cannot send a message to yourself"));
        }

        let conversation = match req.conversation_id {
            Some(id) => {
                let conversation = self
                    .conversations
                    .require_participant(id, req.sender)
                    .await?;
                if conversation.counterpart_of(req.sender) != Some(req.receiver) {
                    return Err(AppError::validation(
                        "receiver is not a participant of this conversation",
                    ));
                }
                conversation
            }
            None => {
                self.conversations
                    .get_or_create(req.sender, req.receiver)
                    .await?
            }
        };

        if let Some(target) = req.reply_to {
            let in_conversation = self
                .messages
                .get(target)
                .await?
                .map(|m| m.conversation_id == conversation.id)
                .unwrap_or(false);
            if !in_conversation {
                return Err(AppError::validation(
                    "reply target is not a message of this conversation",
                ));
            }
        }

        let message = self
            .messages
            .insert(NewMessage {
                conversation_id: conversation.id,
                sender_id: req.sender,
                receiver_id: req.receiver,
                body,
                attachment_url: attachment_url.clone(),
                attachment_name: attachment_url.and(non_blank(req.attachment_name)),
                reply_to: req.reply_to,
            })
            .await?;

        tracing::info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            sender_id = %message.sender_id,
            "message persisted"
        );

        Ok(self
            .delivery
            .deliver_new(message.with_client_temp_id(req.client_temp_id))
            .await)
    }

    async fn load(&self, id: Uuid) -> AppResult<Message> {
        self.messages
            .get(id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    async fn load_own(&self, id: Uuid, user: Uuid) -> AppResult<Message> {
        let message = self.load(id).await?;
        if message.sender_id != user {
            return Err(AppError::forbidden("only the sender can change this message"));
        }
        Ok(message)
    }

    pub async fn edit(&self, id: Uuid, body: String, user: Uuid) -> AppResult<Message> {
        let body = non_blank(Some(body))
            .ok_or_else(|| AppError::validation("Message text is required"))?;

        let existing = self.load_own(id, user).await?;
        if existing.is_deleted {
            return Err(AppError::validation("Cannot edit a deleted message"));
        }

        let updated = self
            .messages
            .update_body(id, body)
            .await?
            .ok_or_else(|| AppError::validation("Cannot edit a deleted message"))?;

        tracing::info!(message_id = %id, "message edited");
        self.delivery.announce_edit(user, &updated);
        Ok(updated)
    }

    /// Tombstones the message. Deleting an already deleted message returns it unchanged.
    pub async fn soft_delete(&self, id: Uuid, user: Uuid) -> AppResult<Message> {
        let existing = self.load_own(id, user).await?;
        if existing.is_deleted {
            return Ok(existing);
        }

        let deleted = self
            .messages
            .tombstone(id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        tracing::info!(message_id = %id, "message deleted");
        self.delivery.announce_delete(user, &deleted);
        Ok(deleted)
    }

    pub async fn react(
        &self,
        id: Uuid,
        emoji: &str,
        user: Uuid,
        client_temp_id: Option<String>,
    ) -> AppResult<Message> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_LEN {
            return Err(AppError::validation(format!(
                "emoji must be 1-{MAX_EMOJI_LEN} characters"
            )));
        }

        let existing = self.load(id).await?;
        if !existing.involves(user) {
            return Err(AppError::forbidden("not a participant of this conversation"));
        }
        if existing.is_deleted {
            return Err(AppError::validation("Cannot react to a deleted message"));
        }

        let updated = self
            .messages
            .add_reaction(
                id,
                Reaction {
                    user_id: user,
                    emoji: emoji.to_string(),
                },
            )
            .await?
            .ok_or(AppError::NotFound("message"))?
            .with_client_temp_id(client_temp_id);

        self.delivery.announce_reaction(user, &updated);
        Ok(updated)
    }

    /// Marks unread messages addressed to `reader` as seen and notifies their
    /// senders. Returns how many messages changed; repeating the call returns 0.
    pub async fn mark_read(&self, reader: Uuid, scope: ReadScope) -> AppResult<usize> {
        if let ReadScope::Conversation(id) = scope {
            self.conversations.require_participant(id, reader).await?;
        }

        let changed = self.messages.mark_read(reader, scope).await?;
        if !changed.is_empty() {
            tracing::debug!(reader_id = %reader, count = changed.len(), "messages marked read");
            self.delivery.announce_read(reader, &changed);
        }
        Ok(changed.len())
    }

    /// Single-message read receipt. Only the receiver may mark it.
    pub async fn mark_message_read(&self, id: Uuid, reader: Uuid) -> AppResult<Message> {
        let existing = self.load(id).await?;
        if existing.receiver_id != reader {
            return Err(AppError::forbidden("only the receiver can mark a message read"));
        }

        let (message, changed) = self
            .messages
            .mark_one_read(id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        if changed {
            self.delivery.announce_read(reader, std::slice::from_ref(&message));
        }
        Ok(message)
    }

    pub async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        user: Uuid,
    ) -> AppResult<Vec<Message>> {
        self.conversations
            .require_participant(conversation_id, user)
            .await?;
        self.messages.list_by_conversation(conversation_id).await
    }

    /// Full history between the caller and `other`; empty if they never talked
    pub async fn list_between(&self, user: Uuid, other: Uuid) -> AppResult<Vec<Message>> {
        match self.conversations.find_between(user, other).await? {
            Some(conversation) => self.messages.list_by_conversation(conversation.id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn inbox(&self, user: Uuid) -> AppResult<Vec<InboxEntry>> {
        self.messages.inbox(user).await
    }

    pub fn typing(&self, from: Uuid, to: Uuid) {
        if from != to {
            self.delivery.relay_typing(from, to);
        }
    }

    pub fn delivery(&self) -> &DeliveryEngine {
        &self.delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryStatus, TOMBSTONE_TEXT};
    use crate::store::Stores;
    use crate::websocket::{ConnectionHandle, PresenceRegistry};

    fn service() -> (MessageService, PresenceRegistry) {
        let stores = Stores::memory();
        let presence = PresenceRegistry::new();
        let delivery = DeliveryEngine::new(Arc::new(presence.clone()), stores.messages.clone());
        let service = MessageService::new(
            ConversationService::new(stores.conversations.clone()),
            stores.messages.clone(),
            delivery,
        );
        (service, presence)
    }

    fn text(sender: Uuid, receiver: Uuid, body: &str) -> SendMessageRequest {
        SendMessageRequest {
            sender,
            receiver,
            body: Some(body.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn send_requires_body_or_attachment() {
        let (service, _) = service();
        let err = service
            .send(SendMessageRequest {
                sender: Uuid::new_v4(),
                receiver: Uuid::new_v4(),
                body: Some("   ".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn attachment_only_message_is_accepted() {
        let (service, _) = service();
        let msg = service
            .send(SendMessageRequest {
                sender: Uuid::new_v4(),
                receiver: Uuid::new_v4(),
                attachment_url: Some("http://localhost:5000/uploads/x.pdf".into()),
                attachment_name: Some("x.pdf".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(msg.body.is_none());
        assert_eq!(msg.attachment_name.as_deref(), Some("x.pdf"));
        assert_eq!(msg.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn edit_and_delete_are_sender_only() {
        let (service, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = service.send(text(a, b, "hello")).await.unwrap();

        assert!(matches!(
            service.edit(msg.id, "hijack".into(), b).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.soft_delete(msg.id, b).await,
            Err(AppError::Forbidden(_))
        ));

        let edited = service.edit(msg.id, "hello again".into(), a).await.unwrap();
        assert!(edited.is_edited);

        let history = service.list_by_conversation(msg.conversation_id, b).await.unwrap();
        assert_eq!(history[0].body.as_deref(), Some("hello again"));
        assert!(history[0].is_edited);
    }

    #[tokio::test]
    async fn delete_twice_is_a_noop() {
        let (service, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = service.send(text(a, b, "oops")).await.unwrap();

        let first = service.soft_delete(msg.id, a).await.unwrap();
        let second = service.soft_delete(msg.id, a).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_deleted && first.body.is_none() && first.attachment_url.is_none());
        assert_eq!(first.id, msg.id);
        assert_eq!(first.conversation_id, msg.conversation_id);

        assert!(matches!(
            service.edit(msg.id, "back".into(), a).await,
            Err(AppError::Validation(_))
        ));
        let inbox = service.inbox(b).await.unwrap();
        assert_eq!(inbox[0].last_message, TOMBSTONE_TEXT);
    }

    #[tokio::test]
    async fn double_reaction_is_deduplicated() {
        let (service, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = service.send(text(b, a, "deal?")).await.unwrap();

        service.react(msg.id, "👍", a, None).await.unwrap();
        let after = service.react(msg.id, "👍", a, None).await.unwrap();
        assert_eq!(after.reactions, vec![Reaction { user_id: a, emoji: "👍".into() }]);

        assert!(matches!(
            service.react(msg.id, "👍", Uuid::new_v4(), None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.react(msg.id, "", a, None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reply_must_target_same_conversation() {
        let (service, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let elsewhere = service.send(text(a, Uuid::new_v4(), "other chat")).await.unwrap();

        let mut req = text(a, b, "re");
        req.reply_to = Some(elsewhere.id);
        assert!(matches!(service.send(req).await, Err(AppError::Validation(_))));

        let first = service.send(text(b, a, "question")).await.unwrap();
        let mut req = text(a, b, "answer");
        req.reply_to = Some(first.id);
        assert_eq!(service.send(req).await.unwrap().reply_to, Some(first.id));
    }

    #[tokio::test]
    async fn mark_read_counts_then_zero() {
        let (service, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = service.send(text(a, b, "one")).await.unwrap();
        service.send(text(a, b, "two")).await.unwrap();

        let scope = ReadScope::Conversation(msg.conversation_id);
        assert_eq!(service.mark_read(b, scope).await.unwrap(), 2);
        assert_eq!(service.mark_read(b, scope).await.unwrap(), 0);
        assert!(matches!(
            service.mark_read(Uuid::new_v4(), scope).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn single_read_is_receiver_only_and_notifies_sender() {
        let (service, presence) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = service.send(text(a, b, "ping")).await.unwrap();

        let (a_handle, mut a_rx) = ConnectionHandle::channel();
        presence.join(a, a_handle);

        assert!(matches!(
            service.mark_message_read(msg.id, a).await,
            Err(AppError::Forbidden(_))
        ));
        let read = service.mark_message_read(msg.id, b).await.unwrap();
        assert!(read.is_read);
        assert_eq!(read.status, DeliveryStatus::Seen);

        let frame: serde_json::Value = serde_json::from_str(&a_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "messageRead");
        assert_eq!(frame["readerId"], b.to_string());

        // Already seen: no second receipt
        service.mark_message_read(msg.id, b).await.unwrap();
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_between_without_history_is_empty() {
        let (service, _) = service();
        assert!(service
            .list_between(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }
}
