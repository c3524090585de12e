//! Delivery coordination: the entry point for every message producer.
//!
//! Connection-originated operations and the daily match sweep both go
//! through [`DeliveryCoordinator`]. It owns the connect/disconnect lifecycle
//! and decides, per message, which live connections get a push. Messages are
//! persisted before any push, so an offline recipient simply finds them in
//! history later.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::chat::ChannelBroadcaster;
use crate::config::ChatConfig;
use crate::directory::UserDirectory;
use crate::dm::ConversationStore;
use crate::error::CoreError;
use crate::events::{ConnectionSender, ServerEvent};
use crate::models::{Message, MessageTag, PrivateMessage, UserIdentity, GENERAL_CHANNEL};
use crate::presence::ConnectionRegistry;

pub struct DeliveryCoordinator {
    registry: Arc<ConnectionRegistry>,
    channels: Arc<ChannelBroadcaster>,
    conversations: Arc<ConversationStore>,
    snapshot_history: usize,
    /// Held from a registry mutation until its presence broadcast is sent,
    /// so listings reach clients in the order the registry changed.
    presence_gate: Mutex<()>,
}

impl DeliveryCoordinator {
    /// Build the coordinator together with the stores it coordinates.
    pub fn new(directory: Arc<dyn UserDirectory>, chat: &ChatConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(directory));
        let channels = Arc::new(ChannelBroadcaster::new(
            registry.clone(),
            chat.max_channel_history,
        ));
        let conversations = Arc::new(ConversationStore::new(chat.max_conversation_history));

        Self {
            registry,
            channels,
            conversations,
            snapshot_history: chat.snapshot_history,
            presence_gate: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn channels(&self) -> &Arc<ChannelBroadcaster> {
        &self.channels
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Bring a connection online.
    ///
    /// The connection joins `general` and receives its recent history and
    /// the presence listing. Everyone else hears about the user only when
    /// this is their first live connection. A connection id previously held
    /// by another user is taken over, announcing that user's leave if it was
    /// their last connection.
    pub async fn connect(
        &self,
        connection_id: &str,
        user_id: &str,
        sender: ConnectionSender,
    ) -> Result<UserIdentity, CoreError> {
        let identity = self.registry.lookup(user_id).await?;

        let _gate = self.lock_presence();
        let registration = self.registry.attach(connection_id, identity, sender);
        if let Some(displaced) = &registration.displaced {
            self.channels
                .unsubscribe_all(connection_id, &displaced.joined_channels);
            if displaced.last_connection {
                self.announce_leave(&displaced.user);
            }
        }

        let identity = registration.identity;
        self.channels.subscribe(connection_id, GENERAL_CHANNEL);
        self.registry.send_to_connection(
            connection_id,
            ServerEvent::ChannelHistory {
                channel_id: GENERAL_CHANNEL.to_string(),
                messages: self
                    .channels
                    .recent_history(GENERAL_CHANNEL, self.snapshot_history),
            },
        );

        if registration.first_connection {
            self.channels.broadcast_system(
                GENERAL_CHANNEL,
                &format!("{} joined the chat", identity.display_name),
            );
            self.broadcast_presence();
            tracing::info!(user_id = %identity.id, "User came online");
        } else {
            self.registry.send_to_connection(
                connection_id,
                ServerEvent::Presence {
                    users: self.registry.presence(),
                },
            );
            tracing::debug!(
                user_id = %identity.id,
                connection_id = %connection_id,
                "Additional connection for online user"
            );
        }

        Ok(identity)
    }

    /// Take a connection offline. Returns the user when this was their last
    /// connection, in which case the leave is announced.
    pub fn disconnect(&self, connection_id: &str) -> Option<UserIdentity> {
        let _gate = self.lock_presence();
        let session = self.registry.resolve(connection_id)?;
        self.channels
            .unsubscribe_all(connection_id, &session.joined_channels);

        let left = self.registry.unregister(connection_id)?;
        self.announce_leave(&left);
        Some(left)
    }

    fn lock_presence(&self) -> MutexGuard<'_, ()> {
        self.presence_gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Caller holds the presence gate.
    fn announce_leave(&self, user: &UserIdentity) {
        self.channels.broadcast_system(
            GENERAL_CHANNEL,
            &format!("{} left the chat", user.display_name),
        );
        self.broadcast_presence();
        tracing::info!(user_id = %user.id, "User went offline");
    }

    fn broadcast_presence(&self) {
        self.registry.broadcast_to_all(&ServerEvent::Presence {
            users: self.registry.presence(),
        });
    }

    /// Publish a user message to a channel, creating the channel if needed.
    pub async fn send_channel_message(
        &self,
        from_user_id: &str,
        channel_id: &str,
        content: &str,
    ) -> Result<Message, CoreError> {
        let author = self.registry.lookup(from_user_id).await?;
        Ok(self.channels.publish(channel_id, &author.id, content))
    }

    /// Persist a private message, then push it to every live connection of
    /// both parties. An offline recipient gets it from history later.
    pub async fn send_private_message(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        content: &str,
        tag: MessageTag,
    ) -> Result<PrivateMessage, CoreError> {
        let (from, to) = tokio::join!(
            self.registry.lookup(from_user_id),
            self.registry.lookup(to_user_id)
        );
        let (from, to) = (from?, to?);

        let registry = &self.registry;
        let mut pushed = 0;
        let message = self
            .conversations
            .append_with(&from.id, &to.id, content, tag, |message| {
                let event = ServerEvent::PrivateMessage {
                    message: message.clone(),
                };
                pushed += registry.send_to_user(&to.id, &event);
                if from.id != to.id {
                    pushed += registry.send_to_user(&from.id, &event);
                }
            });

        if registry.is_online(&to.id) {
            tracing::debug!(
                message_id = %message.id,
                from = %from.id,
                to = %to.id,
                tag = message.tag.as_str(),
                connections = pushed,
                "Private message delivered"
            );
        } else {
            tracing::debug!(
                message_id = %message.id,
                from = %from.id,
                to = %to.id,
                tag = message.tag.as_str(),
                "Recipient offline, private message stored"
            );
        }

        Ok(message)
    }

    /// Subscribe a connection to a room channel and return the room's recent
    /// history. The room is created on first join.
    pub fn join_room(
        &self,
        connection_id: &str,
        room_id: &str,
    ) -> Result<Vec<Message>, CoreError> {
        if self.registry.resolve(connection_id).is_none() {
            return Err(CoreError::ConnectionNotFound(connection_id.to_string()));
        }

        self.channels.subscribe(connection_id, room_id);
        // The connection may have dropped between the check and the subscribe.
        if !self.registry.record_join(connection_id, room_id) {
            self.channels.unsubscribe(connection_id, room_id);
            return Err(CoreError::ConnectionNotFound(connection_id.to_string()));
        }

        tracing::debug!(connection_id = %connection_id, room_id = %room_id, "Joined room");
        Ok(self.channels.recent_history(room_id, self.snapshot_history))
    }

    /// Unsubscribe a connection from a room. Every connection stays in
    /// `general` for its whole life.
    pub fn leave_room(&self, connection_id: &str, room_id: &str) -> Result<(), CoreError> {
        if self.registry.resolve(connection_id).is_none() {
            return Err(CoreError::ConnectionNotFound(connection_id.to_string()));
        }
        if room_id == GENERAL_CHANNEL {
            return Ok(());
        }

        self.channels.unsubscribe(connection_id, room_id);
        self.registry.record_leave(connection_id, room_id);
        tracing::debug!(connection_id = %connection_id, room_id = %room_id, "Left room");
        Ok(())
    }

    pub fn conversation_history(&self, user_a: &str, user_b: &str) -> Vec<PrivateMessage> {
        self.conversations.history(user_a, user_b)
    }

    pub fn recent_history(&self, channel_id: &str, limit: usize) -> Vec<Message> {
        self.channels.recent_history(channel_id, limit)
    }

    pub fn presence(&self) -> Vec<UserIdentity> {
        self.registry.presence()
    }
}
