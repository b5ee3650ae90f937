use crate::client::typing::TypingIndicator;
use crate::models::{DeliveryStatus, Message};
use crate::websocket::events::ServerEvent;
use crate::websocket::message_types::WsInboundEvent;
use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

/// Outcome of merging a server record into the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// An optimistic entry with the same token was swapped in place
    Replaced { index: usize },
    Appended,
    /// Already present, or not part of this conversation
    Ignored,
}

/// A send the client has rendered locally and must now transmit
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub receiver_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub reply_to: Option<Uuid>,
    pub client_temp_id: String,
}

impl OutgoingMessage {
    /// Live-channel frame for this send
    pub fn into_event(self) -> WsInboundEvent {
        WsInboundEvent::SendMessage {
            receiver_id: self.receiver_id,
            conversation_id: self.conversation_id,
            message: self.body,
            file_url: self.attachment_url,
            file_name: self.attachment_name,
            reply_to: self.reply_to,
            client_temp_id: Some(self.client_temp_id),
        }
    }
}

/// `owner`'s ordered view of their conversation with `counterpart`
#[derive(Debug, Clone)]
pub struct ConversationView {
    owner: Uuid,
    counterpart: Uuid,
    conversation_id: Option<Uuid>,
    messages: Vec<Message>,
    typing: TypingIndicator,
}

impl ConversationView {
    pub fn new(owner: Uuid, counterpart: Uuid) -> Self {
        Self {
            owner,
            counterpart,
            conversation_id: None,
            messages: Vec::new(),
            typing: TypingIndicator::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.conversation_id
    }

    pub fn is_typing(&self, now: Instant) -> bool {
        self.typing.is_active(now)
    }

    /// Replaces the list with a full fetch. Pending optimistic entries survive
    /// at the end.
    pub fn load(&mut self, history: Vec<Message>) {
        let pending: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| m.status == DeliveryStatus::Sending)
            .collect();

        if let Some(first) = history.first() {
            self.conversation_id = Some(first.conversation_id);
        }
        self.messages = history;
        self.messages.extend(pending);
    }

    /// Appends an optimistic `sending` entry and returns what to transmit
    pub fn begin_send(
        &mut self,
        body: Option<String>,
        attachment: Option<(String, String)>,
        reply_to: Option<Uuid>,
    ) -> OutgoingMessage {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let (attachment_url, attachment_name) = attachment.unzip();

        self.messages.push(Message {
            id: Uuid::new_v4(),
            conversation_id: self.conversation_id.unwrap_or_else(Uuid::nil),
            sender_id: self.owner,
            receiver_id: self.counterpart,
            body: body.clone(),
            attachment_url: attachment_url.clone(),
            attachment_name: attachment_name.clone(),
            reply_to,
            is_edited: false,
            is_deleted: false,
            is_read: false,
            status: DeliveryStatus::Sending,
            reactions: Vec::new(),
            sequence_number: 0,
            created_at: now,
            updated_at: now,
            client_temp_id: Some(token.clone()),
        });

        OutgoingMessage {
            receiver_id: self.counterpart,
            conversation_id: self.conversation_id,
            body,
            attachment_url,
            attachment_name,
            reply_to,
            client_temp_id: token,
        }
    }

    fn belongs_here(&self, message: &Message) -> bool {
        message.involves(self.owner)
            && message.involves(self.counterpart)
            && self
                .conversation_id
                .map_or(true, |id| id == message.conversation_id)
    }

    /// Merges a server record: replace-by-token, else append-by-id, else ignore.
    pub fn apply_incoming(&mut self, message: Message) -> Reconciled {
        if !self.belongs_here(&message) {
            return Reconciled::Ignored;
        }
        self.conversation_id.get_or_insert(message.conversation_id);

        if let Some(token) = message.client_temp_id.as_deref() {
            let pending = self.messages.iter().position(|m| {
                m.status == DeliveryStatus::Sending && m.client_temp_id.as_deref() == Some(token)
            });
            if let Some(index) = pending {
                // a full fetch may already hold the confirmed record
                let loaded = self
                    .messages
                    .iter()
                    .position(|m| m.id == message.id && m.status != DeliveryStatus::Sending);
                return match loaded {
                    Some(existing) => {
                        self.messages.remove(index);
                        let existing = if existing > index { existing - 1 } else { existing };
                        self.messages[existing] = message;
                        Reconciled::Replaced { index: existing }
                    }
                    None => {
                        self.messages[index] = message;
                        Reconciled::Replaced { index }
                    }
                };
            }
        }

        if self.messages.iter().any(|m| m.id == message.id) {
            return Reconciled::Ignored;
        }
        self.messages.push(message);
        Reconciled::Appended
    }

    /// REST confirmation of a send; reconciles the same way as a live push
    pub fn confirm(&mut self, message: Message) -> Reconciled {
        self.apply_incoming(message)
    }

    /// Rolls back an optimistic entry whose send was refused
    pub fn fail_send(&mut self, client_temp_id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| {
            m.status == DeliveryStatus::Sending
                && m.client_temp_id.as_deref() == Some(client_temp_id)
        })?;
        Some(self.messages.remove(index))
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id && m.status != DeliveryStatus::Sending)
    }

    pub fn apply_edit(&mut self, edited: &Message) -> bool {
        match self.find_mut(edited.id) {
            Some(local) => {
                local.body = edited.body.clone();
                local.is_edited = true;
                local.updated_at = edited.updated_at;
                true
            }
            None => false,
        }
    }

    pub fn apply_delete(&mut self, deleted: &Message) -> bool {
        match self.find_mut(deleted.id) {
            Some(local) => {
                local.tombstone(deleted.updated_at);
                true
            }
            None => false,
        }
    }

    pub fn apply_reaction(&mut self, reacted: &Message) -> bool {
        match self.find_mut(reacted.id) {
            Some(local) => {
                local.reactions = reacted.reactions.clone();
                true
            }
            None => false,
        }
    }

    /// Marks messages addressed to `reader` as seen. An empty `message_ids`
    /// covers every such message in the view. Returns how many changed.
    pub fn apply_read(&mut self, reader: Uuid, conversation_id: Uuid, message_ids: &[Uuid]) -> usize {
        if self.conversation_id.is_some_and(|id| id != conversation_id) {
            return 0;
        }

        let mut changed = 0;
        for m in self.messages.iter_mut() {
            if m.receiver_id != reader || m.status == DeliveryStatus::Sending {
                continue;
            }
            if !message_ids.is_empty() && !message_ids.contains(&m.id) {
                continue;
            }
            if m.status != DeliveryStatus::Seen || !m.is_read {
                m.status = m.status.advance(DeliveryStatus::Seen);
                m.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Applies one live event. Returns whether the view changed.
    pub fn apply_event(&mut self, event: ServerEvent, now: Instant) -> bool {
        match event {
            ServerEvent::ReceiveMessage(message) => {
                self.apply_incoming(message) != Reconciled::Ignored
            }
            ServerEvent::MessageEdited(message) => self.apply_edit(&message),
            ServerEvent::MessageDeleted(message) => self.apply_delete(&message),
            ServerEvent::ReceiveReaction(message) => self.apply_reaction(&message),
            ServerEvent::MessageRead {
                reader_id,
                conversation_id,
                message_ids,
            } => self.apply_read(reader_id, conversation_id, &message_ids) > 0,
            ServerEvent::Typing { sender_id } => {
                if sender_id != self.counterpart {
                    return false;
                }
                self.typing.ping(now);
                true
            }
            ServerEvent::MessageError {
                client_temp_id: Some(token),
                ..
            } => self.fail_send(&token).is_some(),
            ServerEvent::MessageError { .. } | ServerEvent::Error { .. } => false,
        }
    }
}
