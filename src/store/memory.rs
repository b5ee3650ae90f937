//! In-process backend used for development and tests. One `RwLock` guards
//! all state, so each trait method is a single critical section.

use super::{inbox_entry, ConversationStore, MessageStore};
use crate::error::AppResult;
use crate::models::{
    Conversation, DeliveryStatus, InboxEntry, Message, NewMessage, Reaction, ReadScope,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
    /// Message ids per conversation in insertion order
    timeline: HashMap<Uuid, Vec<Uuid>>,
    next_seq: i64,
}

impl Inner {
    fn ordered(&self, conversation_id: Uuid) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .timeline
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.messages.get(id).cloned())
            .collect();
        out.sort_by_key(|m| (m.created_at, m.sequence_number));
        out
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_or_create(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let pair = Conversation::pair(a, b);
        let mut inner = self.inner.write();

        if let Some(existing) = inner
            .by_pair
            .get(&pair)
            .and_then(|id| inner.conversations.get(id))
        {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            members: [pair.0, pair.1],
            last_message_id: None,
            created_at: Utc::now(),
        };
        inner.by_pair.insert(pair, conversation.id);
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        tracing::debug!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().conversations.get(&id).cloned())
    }

    async fn find_by_pair(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        let inner = self.inner.read();
        Ok(inner
            .by_pair
            .get(&Conversation::pair(a, b))
            .and_then(|id| inner.conversations.get(id))
            .cloned())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, new: NewMessage) -> AppResult<Message> {
        let mut inner = self.inner.write();
        inner.next_seq += 1;
        let now = Utc::now();

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            body: new.body,
            attachment_url: new.attachment_url,
            attachment_name: new.attachment_name,
            reply_to: new.reply_to,
            is_edited: false,
            is_deleted: false,
            is_read: false,
            status: DeliveryStatus::Sent,
            reactions: Vec::new(),
            sequence_number: inner.next_seq,
            created_at: now,
            updated_at: now,
            client_temp_id: None,
        };

        inner.messages.insert(message.id, message.clone());
        inner
            .timeline
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        if let Some(conversation) = inner.conversations.get_mut(&message.conversation_id) {
            conversation.last_message_id = Some(message.id);
        }

        Ok(message)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.inner.read().messages.get(&id).cloned())
    }

    async fn update_body(&self, id: Uuid, body: String) -> AppResult<Option<Message>> {
        let mut inner = self.inner.write();
        Ok(inner
            .messages
            .get_mut(&id)
            .filter(|m| !m.is_deleted)
            .map(|m| {
                m.body = Some(body);
                m.is_edited = true;
                m.updated_at = Utc::now();
                m.clone()
            }))
    }

    async fn tombstone(&self, id: Uuid) -> AppResult<Option<Message>> {
        let mut inner = self.inner.write();
        Ok(inner.messages.get_mut(&id).map(|m| {
            if !m.is_deleted {
                m.tombstone(Utc::now());
            }
            m.clone()
        }))
    }

    async fn add_reaction(&self, id: Uuid, reaction: Reaction) -> AppResult<Option<Message>> {
        let mut inner = self.inner.write();
        Ok(inner.messages.get_mut(&id).map(|m| {
            m.add_reaction(reaction);
            m.clone()
        }))
    }

    async fn advance_status(&self, id: Uuid, to: DeliveryStatus) -> AppResult<Option<Message>> {
        let mut inner = self.inner.write();
        Ok(inner.messages.get_mut(&id).map(|m| {
            m.status = m.status.advance(to);
            m.clone()
        }))
    }

    async fn mark_read(&self, reader: Uuid, scope: ReadScope) -> AppResult<Vec<Message>> {
        let mut inner = self.inner.write();
        let now = Utc::now();

        let mut changed: Vec<Message> = inner
            .messages
            .values_mut()
            .filter(|m| m.receiver_id == reader && !m.is_read)
            .filter(|m| match scope {
                ReadScope::Conversation(id) => m.conversation_id == id,
                ReadScope::From(sender) => m.sender_id == sender,
            })
            .map(|m| {
                m.is_read = true;
                m.status = m.status.advance(DeliveryStatus::Seen);
                m.updated_at = now;
                m.clone()
            })
            .collect();
        changed.sort_by_key(|m| (m.created_at, m.sequence_number));
        Ok(changed)
    }

    async fn mark_one_read(&self, id: Uuid) -> AppResult<Option<(Message, bool)>> {
        let mut inner = self.inner.write();
        Ok(inner.messages.get_mut(&id).map(|m| {
            let changed = !m.is_read || m.status < DeliveryStatus::Seen;
            if changed {
                m.is_read = true;
                m.status = m.status.advance(DeliveryStatus::Seen);
                m.updated_at = Utc::now();
            }
            (m.clone(), changed)
        }))
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        Ok(self.inner.read().ordered(conversation_id))
    }

    async fn inbox(&self, user: Uuid) -> AppResult<Vec<InboxEntry>> {
        let inner = self.inner.read();
        let mut latest: Vec<&Message> = inner
            .conversations
            .values()
            .filter(|c| c.has_member(user))
            .filter_map(|c| c.last_message_id)
            .filter_map(|id| inner.messages.get(&id))
            .collect();
        latest.sort_by_key(|m| std::cmp::Reverse((m.created_at, m.sequence_number)));
        Ok(latest.into_iter().map(|m| inbox_entry(user, m)).collect())
    }
}
