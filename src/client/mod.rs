//! Client-side reconciliation of one conversation.
//!
//! A client renders its own sends optimistically and later receives the
//! durable record through the REST response, the live push, or both.
//! [`ConversationView`] merges all of those into one ordered list keyed by
//! permanent id, using the correlation token to swap optimistic entries for
//! their confirmed records.

pub mod typing;
pub mod view;

pub use typing::{TypingIndicator, TYPING_TIMEOUT};
pub use view::{ConversationView, OutgoingMessage, Reconciled};
