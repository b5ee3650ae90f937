//! Server → client events.
//!
//! Every frame is a JSON object tagged by `"type"`. Message-carrying events
//! flatten the full message record next to the tag, so a client can merge the
//! payload straight into its view.

use crate::models::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// New message; carries `clientTempId` when pushed back to its sender
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(Message),

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { sender_id: Uuid },

    #[serde(rename = "messageEdited")]
    MessageEdited(Message),

    #[serde(rename = "messageDeleted")]
    MessageDeleted(Message),

    #[serde(rename = "receiveReaction")]
    ReceiveReaction(Message),

    /// `reader_id` has now seen the listed messages of `conversation_id`
    #[serde(rename = "messageRead", rename_all = "camelCase")]
    MessageRead {
        reader_id: Uuid,
        conversation_id: Uuid,
        #[serde(default)]
        message_ids: Vec<Uuid>,
    },

    /// A live send failed; the client rolls back the optimistic entry
    #[serde(rename = "messageError", rename_all = "camelCase")]
    MessageError {
        client_temp_id: Option<String>,
        error: String,
    },

    /// Malformed or refused client frame
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage(_) => "receiveMessage",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::MessageEdited(_) => "messageEdited",
            ServerEvent::MessageDeleted(_) => "messageDeleted",
            ServerEvent::ReceiveReaction(_) => "receiveReaction",
            ServerEvent::MessageRead { .. } => "messageRead",
            ServerEvent::MessageError { .. } => "messageError",
            ServerEvent::Error { .. } => "error",
        }
    }
}
