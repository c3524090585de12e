use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::events::ServerEvent;
use crate::models::{
    new_message_id, ChannelId, ConnectionId, Message, MessageKind, GENERAL_CHANNEL,
};
use crate::presence::ConnectionRegistry;

/// Default bound on retained messages per channel.
pub const DEFAULT_MAX_CHANNEL_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    General,
    Room,
}

impl ChannelKind {
    pub fn of(channel_id: &str) -> Self {
        if channel_id == GENERAL_CHANNEL {
            Self::General
        } else {
            Self::Room
        }
    }
}

/// Point-in-time view of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    pub kind: ChannelKind,
    pub subscribers: usize,
    pub messages: usize,
}

#[derive(Debug, Default)]
struct Channel {
    history: VecDeque<Message>,
    subscribers: HashSet<ConnectionId>,
}

impl Channel {
    fn summary(&self, channel_id: &str) -> ChannelSummary {
        ChannelSummary {
            channel_id: channel_id.to_string(),
            kind: ChannelKind::of(channel_id),
            subscribers: self.subscribers.len(),
            messages: self.history.len(),
        }
    }
}

/// Named broadcast channels with bounded history.
///
/// Appending and fan-out for a channel happen under that channel's entry
/// lock, so every subscriber sees messages in history order.
pub struct ChannelBroadcaster {
    registry: Arc<ConnectionRegistry>,
    channels: DashMap<ChannelId, Channel>,
    max_history: usize,
}

impl ChannelBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, max_history: usize) -> Self {
        let broadcaster = Self {
            registry,
            channels: DashMap::new(),
            max_history: max_history.max(1),
        };
        broadcaster.ensure_channel(GENERAL_CHANNEL);
        broadcaster
    }

    /// Create the channel if it does not exist yet.
    pub fn ensure_channel(&self, channel_id: &str) -> ChannelSummary {
        let channel = self.channels.entry(channel_id.to_string()).or_default();
        channel.summary(channel_id)
    }

    pub fn subscribe(&self, connection_id: &str, channel_id: &str) {
        self.channels
            .entry(channel_id.to_string())
            .or_default()
            .subscribers
            .insert(connection_id.to_string());
    }

    /// Remove a subscriber. A room left with no subscribers is dropped along
    /// with its history; `general` is permanent.
    pub fn unsubscribe(&self, connection_id: &str, channel_id: &str) {
        if let Some(mut channel) = self.channels.get_mut(channel_id) {
            channel.subscribers.remove(connection_id);
        }
        if channel_id != GENERAL_CHANNEL
            && self
                .channels
                .remove_if(channel_id, |_, channel| channel.subscribers.is_empty())
                .is_some()
        {
            tracing::debug!(channel_id = %channel_id, "Empty room dropped");
        }
    }

    pub fn unsubscribe_all<'a>(
        &self,
        connection_id: &str,
        channel_ids: impl IntoIterator<Item = &'a ChannelId>,
    ) {
        for channel_id in channel_ids {
            self.unsubscribe(connection_id, channel_id);
        }
    }

    /// Publish a user message.
    pub fn publish(&self, channel_id: &str, author_user_id: &str, content: &str) -> Message {
        self.append_and_deliver(channel_id, Some(author_user_id), content, MessageKind::User)
    }

    /// Publish a system notice (joins, leaves) through the same stream as
    /// user messages.
    pub fn broadcast_system(&self, channel_id: &str, text: &str) -> Message {
        self.append_and_deliver(channel_id, None, text, MessageKind::System)
    }

    fn append_and_deliver(
        &self,
        channel_id: &str,
        author_user_id: Option<&str>,
        content: &str,
        kind: MessageKind,
    ) -> Message {
        let message = Message {
            id: new_message_id(),
            channel_id: channel_id.to_string(),
            author_user_id: author_user_id.map(str::to_string),
            content: content.to_string(),
            created_at: Utc::now(),
            kind,
        };

        let mut channel = self.channels.entry(channel_id.to_string()).or_default();
        channel.history.push_back(message.clone());
        while channel.history.len() > self.max_history {
            channel.history.pop_front();
        }

        let event = ServerEvent::Message {
            message: message.clone(),
        };
        // Subscribers whose connection is gone are dropped here.
        let registry = &self.registry;
        channel
            .subscribers
            .retain(|connection_id| registry.send_to_connection(connection_id, event.clone()));

        tracing::debug!(
            channel_id = %channel_id,
            message_id = %message.id,
            kind = ?kind,
            delivered = channel.subscribers.len(),
            "Channel message published"
        );

        message
    }

    /// The most recent `limit` messages, oldest first.
    pub fn recent_history(&self, channel_id: &str, limit: usize) -> Vec<Message> {
        match self.channels.get(channel_id) {
            Some(channel) => {
                let skip = channel.history.len().saturating_sub(limit);
                channel.history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn is_subscribed(&self, connection_id: &str, channel_id: &str) -> bool {
        self.channels
            .get(channel_id)
            .map(|c| c.subscribers.contains(connection_id))
            .unwrap_or(false)
    }

    /// Summaries of every channel, sorted by id.
    pub fn stats(&self) -> Vec<ChannelSummary> {
        let mut summaries: Vec<ChannelSummary> = self
            .channels
            .iter()
            .map(|entry| entry.value().summary(entry.key()))
            .collect();
        summaries.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        summaries
    }
}
