//! Events pushed from the core to individual connections.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{ChannelId, Message, PrivateMessage, UserId, UserIdentity};

/// The publish primitive addressing exactly one connection. The transport
/// owns the receiving half and forwards events to its client.
pub type ConnectionSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A channel message, user-authored or system.
    Message { message: Message },
    PrivateMessage { message: PrivateMessage },
    /// De-duplicated list of online users.
    Presence { users: Vec<UserIdentity> },
    ChannelHistory {
        channel_id: ChannelId,
        messages: Vec<Message>,
    },
    ConversationHistory {
        other_user_id: UserId,
        messages: Vec<PrivateMessage>,
    },
    Error { code: u16, message: String },
}
