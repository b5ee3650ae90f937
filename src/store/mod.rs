//! Durable state: conversations and messages.
//!
//! Both backends implement the same pair of traits. Every mutation is a single
//! atomic step inside the store (one lock acquisition or one SQL statement or
//! transaction) so concurrent handlers never lose updates.

pub mod memory;
pub mod postgres;

use crate::error::AppResult;
use crate::models::{Conversation, DeliveryStatus, InboxEntry, Message, NewMessage, Reaction, ReadScope};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Atomic find-or-create for the unordered pair `{a, b}`
    async fn get_or_create(&self, a: Uuid, b: Uuid) -> AppResult<Conversation>;

    async fn find(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn find_by_pair(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists with status `sent` and moves the conversation's last-message pointer
    async fn insert(&self, new: NewMessage) -> AppResult<Message>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Replaces the body and sets `is_edited`. Returns `None` when the message
    /// is missing or tombstoned.
    async fn update_body(&self, id: Uuid, body: String) -> AppResult<Option<Message>>;

    /// Clears body and attachment and sets `is_deleted`. Repeating it is a no-op.
    async fn tombstone(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Adds the `(user, emoji)` pair unless already present
    async fn add_reaction(&self, id: Uuid, reaction: Reaction) -> AppResult<Option<Message>>;

    /// Moves status forward to `to`; never lowers it
    async fn advance_status(&self, id: Uuid, to: DeliveryStatus) -> AppResult<Option<Message>>;

    /// Marks every unread message addressed to `reader` within `scope` as read
    /// and seen. Returns only the messages this call changed.
    async fn mark_read(&self, reader: Uuid, scope: ReadScope) -> AppResult<Vec<Message>>;

    /// Marks one message read and seen. The flag reports whether it changed.
    async fn mark_one_read(&self, id: Uuid) -> AppResult<Option<(Message, bool)>>;

    /// Ascending by `(created_at, sequence_number)`
    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Latest message per conversation the user takes part in, newest first
    async fn inbox(&self, user: Uuid) -> AppResult<Vec<InboxEntry>>;
}

/// Handles to the configured backend
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            conversations: store.clone(),
            messages: store,
        }
    }

    pub fn postgres(pool: db_pool::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            conversations: store.clone(),
            messages: store,
        }
    }
}

pub(crate) fn inbox_entry(user: Uuid, msg: &Message) -> InboxEntry {
    InboxEntry {
        conversation_id: msg.conversation_id,
        counterpart_id: msg.counterpart_of(user),
        last_message: msg.preview(),
        last_message_id: msg.id,
        last_sender_id: msg.sender_id,
        last_time: msg.created_at,
        is_read: msg.is_read,
    }
}
