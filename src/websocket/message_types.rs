use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound WebSocket events from client to server.
///
/// Identity fields a client may still send (`senderId`, `readerId`) are
/// ignored: the session's authenticated user is always the actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join { user_id: Uuid },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { receiver_id: Uuid },

    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        receiver_id: Uuid,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        reply_to: Option<Uuid>,
        #[serde(default)]
        client_temp_id: Option<String>,
    },

    #[serde(rename = "editMessage", rename_all = "camelCase")]
    EditMessage {
        #[serde(alias = "msgId")]
        id: Uuid,
        message: String,
    },

    #[serde(rename = "deleteMessage", rename_all = "camelCase")]
    DeleteMessage {
        #[serde(alias = "msgId")]
        id: Uuid,
    },

    #[serde(rename = "reactMessage", rename_all = "camelCase")]
    ReactMessage {
        msg_id: Uuid,
        emoji: String,
        #[serde(default)]
        client_temp_id: Option<String>,
    },

    #[serde(rename = "message-read", rename_all = "camelCase")]
    MessageRead { conversation_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_frames() {
        let receiver = Uuid::new_v4();
        let frame = format!(
            r#"{{"type":"sendMessage","receiverId":"{receiver}","senderId":"{}","message":"hello","clientTempId":"t1","conversationId":null}}"#,
            Uuid::new_v4()
        );
        let event: WsInboundEvent = serde_json::from_str(&frame).unwrap();
        match event {
            WsInboundEvent::SendMessage {
                receiver_id,
                conversation_id,
                message,
                client_temp_id,
                ..
            } => {
                assert_eq!(receiver_id, receiver);
                assert!(conversation_id.is_none());
                assert_eq!(message.as_deref(), Some("hello"));
                assert_eq!(client_temp_id.as_deref(), Some("t1"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let conv = Uuid::new_v4();
        let read: WsInboundEvent = serde_json::from_str(&format!(
            r#"{{"type":"message-read","conversationId":"{conv}","readerId":"{}"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert_eq!(read, WsInboundEvent::MessageRead { conversation_id: conv });
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(serde_json::from_str::<WsInboundEvent>(r#"{"type":"recall"}"#).is_err());
    }
}
