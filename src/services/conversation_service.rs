use crate::error::{AppError, AppResult};
use crate::models::Conversation;
use crate::store::ConversationStore;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Conversation between `user` and `other`, created on first use
    pub async fn get_or_create(&self, user: Uuid, other: Uuid) -> AppResult<Conversation> {
        if user == other {
            return Err(AppError::validation("Cannot start a conversation with yourself"));
        }
        self.store.get_or_create(user, other).await
    }

    pub async fn find_between(&self, user: Uuid, other: Uuid) -> AppResult<Option<Conversation>> {
        self.store.find_by_pair(user, other).await
    }

    /// Loads the conversation and checks `user` is one of its two members
    pub async fn require_participant(
        &self,
        conversation_id: Uuid,
        user: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .find(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if !conversation.has_member(user) {
            return Err(AppError::forbidden("not a participant of this conversation"));
        }
        Ok(conversation)
    }
}
