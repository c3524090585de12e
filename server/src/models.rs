use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type ConnectionId = String;
pub type ChannelId = String;

/// Name of the singleton channel every registered connection joins.
pub const GENERAL_CHANNEL: &str = "general";

/// Read-only snapshot of a user, as held by the user directory.
///
/// Field aliases accept the directory's flat-file names (`username`,
/// `profilePicture`) so records can be deserialized straight from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    #[serde(alias = "username")]
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default, alias = "profilePicture")]
    pub avatar_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    User,
}

/// A channel message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: ChannelId,
    /// Absent for system messages (joins, leaves).
    pub author_user_id: Option<UserId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
}

/// Why a private message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum MessageTag {
    Normal,
    Icebreaker,
    DailyMatch { match_score: f64 },
}

impl MessageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Icebreaker => "icebreaker",
            Self::DailyMatch { .. } => "daily_match",
        }
    }

    pub fn match_score(&self) -> Option<f64> {
        match self {
            Self::DailyMatch { match_score } => Some(*match_score),
            _ => None,
        }
    }
}

/// A message in a two-party conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: String,
    pub conversation_key: String,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub tag: MessageTag,
}

/// Generate a fresh, time-ordered message id.
pub fn new_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
