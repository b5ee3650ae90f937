pub mod conversation_service;
pub mod delivery;
pub mod message_service;
pub mod uploads;

pub use conversation_service::ConversationService;
pub use delivery::{DeliveryEngine, Notifier};
pub use message_service::{MessageService, SendMessageRequest};
pub use uploads::{StoredFile, UploadStore};
