use serde::{Deserialize, Serialize};

use crate::chat::handlers::clamp_limit;
use crate::events::{ConnectionSender, ServerEvent};
use crate::models::{MessageTag, GENERAL_CHANNEL};
use crate::state::AppState;

/// Maximum message content length (chars).
const MAX_CONTENT_LENGTH: usize = 4000;

/// Commands a client may send, one JSON object per text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    SendMessage {
        #[serde(default = "general_channel")]
        channel_id: String,
        content: String,
    },
    SendPrivateMessage {
        to_user_id: String,
        content: String,
        /// Set when the text came from a suggested icebreaker.
        #[serde(default)]
        icebreaker: bool,
    },
    GetConversationHistory {
        other_user_id: String,
    },
    GetChannelHistory {
        channel_id: String,
        limit: Option<usize>,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
}

fn general_channel() -> String {
    GENERAL_CHANNEL.to_string()
}

/// Handle an incoming text frame.
/// Decodes the command, dispatches it, and replies on `tx` when the command
/// has a direct answer or fails.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    connection_id: &str,
    user_id: &str,
) {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to decode client command"
            );
            send_error(tx, 400, "Invalid command");
            return;
        }
    };

    dispatch_command(command, tx, state, connection_id, user_id).await;
}

/// Trimmed content, or an error reply when it is empty or too long.
fn validate_content(tx: &ConnectionSender, content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        send_error(tx, 400, "Message content is empty");
        return None;
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        send_error(tx, 413, "Message content is too long");
        return None;
    }
    Some(content.to_string())
}

async fn dispatch_command(
    command: ClientCommand,
    tx: &ConnectionSender,
    state: &AppState,
    connection_id: &str,
    user_id: &str,
) {
    let delivery = &state.delivery;

    match command {
        ClientCommand::SendMessage {
            channel_id,
            content,
        } => {
            let Some(content) = validate_content(tx, &content) else {
                return;
            };
            // The author hears their own message through the channel fan-out.
            if let Err(e) = delivery
                .send_channel_message(user_id, &channel_id, &content)
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Channel message rejected");
                send_error(tx, e.status_code().as_u16(), &e.to_string());
            }
        }
        ClientCommand::SendPrivateMessage {
            to_user_id,
            content,
            icebreaker,
        } => {
            let Some(content) = validate_content(tx, &content) else {
                return;
            };
            let tag = if icebreaker {
                MessageTag::Icebreaker
            } else {
                MessageTag::Normal
            };
            if let Err(e) = delivery
                .send_private_message(user_id, &to_user_id, &content, tag)
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Private message rejected");
                send_error(tx, e.status_code().as_u16(), &e.to_string());
            }
        }
        ClientCommand::GetConversationHistory { other_user_id } => {
            let messages = delivery.conversation_history(user_id, &other_user_id);
            let _ = tx.send(ServerEvent::ConversationHistory {
                other_user_id,
                messages,
            });
        }
        ClientCommand::GetChannelHistory { channel_id, limit } => {
            let messages = delivery.recent_history(&channel_id, clamp_limit(limit));
            let _ = tx.send(ServerEvent::ChannelHistory {
                channel_id,
                messages,
            });
        }
        ClientCommand::JoinRoom { room_id } => match delivery.join_room(connection_id, &room_id) {
            Ok(messages) => {
                let _ = tx.send(ServerEvent::ChannelHistory {
                    channel_id: room_id,
                    messages,
                });
            }
            Err(e) => send_error(tx, e.status_code().as_u16(), &e.to_string()),
        },
        ClientCommand::LeaveRoom { room_id } => {
            if let Err(e) = delivery.leave_room(connection_id, &room_id) {
                send_error(tx, e.status_code().as_u16(), &e.to_string());
            }
        }
    }
}

/// Send an error event to the client.
fn send_error(tx: &ConnectionSender, code: u16, message: &str) {
    let _ = tx.send(ServerEvent::Error {
        code,
        message: message.to_string(),
    });
}
