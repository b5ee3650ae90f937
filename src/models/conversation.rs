use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation between exactly two users. The pair is kept ordered so
/// `(a, b)` and `(b, a)` name the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub members: [Uuid; 2],
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Canonical ordering of a participant pair
    pub fn pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn has_member(&self, user: Uuid) -> bool {
        self.members.contains(&user)
    }

    pub fn counterpart_of(&self, user: Uuid) -> Option<Uuid> {
        match self.members {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }
}

/// One row of a user's inbox: the latest message with one counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    pub conversation_id: Uuid,
    pub counterpart_id: Uuid,
    pub last_message: String,
    pub last_message_id: Uuid,
    pub last_sender_id: Uuid,
    pub last_time: DateTime<Utc>,
    pub is_read: bool,
}
