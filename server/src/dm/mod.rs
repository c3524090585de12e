pub mod conversations;
pub mod handlers;

pub use conversations::{ConversationKey, ConversationStore, DEFAULT_MAX_CONVERSATION_HISTORY};
