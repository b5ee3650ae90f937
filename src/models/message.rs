use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text shown in place of a deleted message's body
pub const TOMBSTONE_TEXT: &str = "This message was deleted";

/// Delivery state of a message. Ordered: a message only ever moves to a
/// greater state, and `Seen` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Held only in the sender's local view, never persisted
    Sending,
    Sent,
    Delivered,
    Seen,
}

impl DeliveryStatus {
    /// Forward-only transition
    pub fn advance(self, to: DeliveryStatus) -> DeliveryStatus {
        self.max(to)
    }

    /// Rank stored in the `messages.status` column
    pub fn to_db(self) -> i16 {
        match self {
            DeliveryStatus::Sending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Seen => 3,
        }
    }

    pub fn from_db(rank: i16) -> Option<Self> {
        match rank {
            0 => Some(DeliveryStatus::Sending),
            1 => Some(DeliveryStatus::Sent),
            2 => Some(DeliveryStatus::Delivered),
            3 => Some(DeliveryStatus::Seen),
            _ => None,
        }
    }
}

/// One user's reaction token on a message. A message holds each pair at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(rename = "message", default)]
    pub body: Option<String>,
    #[serde(rename = "fileUrl", default)]
    pub attachment_url: Option<String>,
    #[serde(rename = "fileName", default)]
    pub attachment_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub is_read: bool,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Store-assigned tiebreaker for messages sharing a timestamp
    #[serde(default)]
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Correlation token echoed back to the sender; never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
}

impl Message {
    pub fn with_client_temp_id(mut self, token: Option<String>) -> Self {
        self.client_temp_id = token;
        self
    }

    /// The participant on the other side from `user`
    pub fn counterpart_of(&self, user: Uuid) -> Uuid {
        if self.sender_id == user {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    pub fn involves(&self, user: Uuid) -> bool {
        self.sender_id == user || self.receiver_id == user
    }

    /// Body as shown in previews: tombstone text for deleted messages
    pub fn preview(&self) -> String {
        if self.is_deleted {
            TOMBSTONE_TEXT.to_string()
        } else {
            self.body.clone().unwrap_or_default()
        }
    }

    /// Clears content and marks the record deleted. Identity, linkage and
    /// timestamps other than `updated_at` are kept.
    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.body = None;
        self.attachment_url = None;
        self.attachment_name = None;
        self.is_deleted = true;
        self.updated_at = at;
    }

    /// Inserts the reaction unless the same user already reacted with the same token.
    /// Returns whether the set changed.
    pub fn add_reaction(&mut self, reaction: Reaction) -> bool {
        if self.reactions.contains(&reaction) {
            return false;
        }
        self.reactions.push(reaction);
        true
    }
}

/// Validated input for a message insert
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub attachment_name: Option<String>,
    pub reply_to: Option<Uuid>,
}

/// Which unread messages a read receipt covers. Either way only messages
/// addressed to the reader are touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadScope {
    Conversation(Uuid),
    /// Everything the given counterpart sent to the reader
    From(Uuid),
}
