pub mod conversation;
pub mod message;

pub use conversation::{Conversation, InboxEntry};
pub use message::{DeliveryStatus, Message, NewMessage, Reaction, ReadScope, TOMBSTONE_TEXT};
