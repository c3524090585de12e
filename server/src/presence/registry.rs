use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::error::CoreError;
use crate::events::{ConnectionSender, ServerEvent};
use crate::models::{ChannelId, ConnectionId, UserId, UserIdentity, GENERAL_CHANNEL};

/// A live, registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    pub user: UserIdentity,
    pub joined_channels: HashSet<ChannelId>,
    sender: ConnectionSender,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Identity freshly resolved from the directory.
    pub identity: UserIdentity,
    /// True when the user had no other live connection.
    pub first_connection: bool,
    /// Set when the connection id was held by a different user.
    pub displaced: Option<DisplacedSession>,
}

/// The previous owner of a re-registered connection id.
#[derive(Debug, Clone)]
pub struct DisplacedSession {
    pub user: UserIdentity,
    pub joined_channels: HashSet<ChannelId>,
    /// True when this was that user's last live connection.
    pub last_connection: bool,
}

/// Everything the registry knows about one online user.
#[derive(Debug, Clone)]
struct OnlineUser {
    identity: UserIdentity,
    connections: HashSet<ConnectionId>,
}

/// Tracks live connections and the users behind them.
///
/// A user may hold several connections at once (tabs, devices). The
/// `user_id -> connections` relation is kept explicitly and is the only
/// thing presence decisions consult.
pub struct ConnectionRegistry {
    directory: Arc<dyn UserDirectory>,
    /// connection_id -> session
    sessions: DashMap<ConnectionId, ConnectionSession>,
    /// user_id -> identity snapshot and live connection ids
    online: DashMap<UserId, OnlineUser>,
}

impl ConnectionRegistry {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            directory,
            sessions: DashMap::new(),
            online: DashMap::new(),
        }
    }

    /// Register a connection for `user_id`: [`lookup`](Self::lookup)
    /// followed by [`attach`](Self::attach).
    pub async fn register(
        &self,
        connection_id: &str,
        user_id: &str,
        sender: ConnectionSender,
    ) -> Result<Registration, CoreError> {
        let identity = self.lookup(user_id).await?;
        Ok(self.attach(connection_id, identity, sender))
    }

    /// Resolve a user against the directory. Nothing the client sent about
    /// its profile is trusted.
    pub async fn lookup(&self, user_id: &str) -> Result<UserIdentity, CoreError> {
        self.directory
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))
    }

    /// Bind a connection to an already resolved identity.
    ///
    /// Re-attaching a connection id keeps its joined channels when the user
    /// is unchanged. When it belonged to someone else, that user is detached
    /// and reported in [`Registration::displaced`].
    pub fn attach(
        &self,
        connection_id: &str,
        identity: UserIdentity,
        sender: ConnectionSender,
    ) -> Registration {
        let mut joined_channels = HashSet::from([GENERAL_CHANNEL.to_string()]);
        if let Some(previous) = self.sessions.get(connection_id) {
            if previous.user.id == identity.id {
                joined_channels.extend(previous.joined_channels.iter().cloned());
            }
        }

        let previous = self.sessions.insert(
            connection_id.to_string(),
            ConnectionSession {
                connection_id: connection_id.to_string(),
                user: identity.clone(),
                joined_channels,
                sender,
            },
        );
        let displaced = previous
            .filter(|previous| previous.user.id != identity.id)
            .map(|previous| {
                let last_connection = self.detach(&previous.user.id, connection_id).is_some();
                DisplacedSession {
                    user: previous.user,
                    joined_channels: previous.joined_channels,
                    last_connection,
                }
            });

        let first_connection = {
            let mut entry = self
                .online
                .entry(identity.id.clone())
                .or_insert_with(|| OnlineUser {
                    identity: identity.clone(),
                    connections: HashSet::new(),
                });
            entry.identity = identity.clone();
            let first = entry.connections.is_empty();
            entry.connections.insert(connection_id.to_string());
            first
        };

        tracing::debug!(
            user_id = %identity.id,
            connection_id = %connection_id,
            first_connection,
            displaced = displaced.is_some(),
            "Connection registered"
        );

        Registration {
            identity,
            first_connection,
            displaced,
        }
    }

    /// Look up a live session.
    pub fn resolve(&self, connection_id: &str) -> Option<ConnectionSession> {
        self.sessions.get(connection_id).map(|s| s.value().clone())
    }

    /// All live connection ids of a user (empty when offline).
    pub fn connections_for(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.online
            .get(user_id)
            .map(|u| u.connections.clone())
            .unwrap_or_default()
    }

    /// Remove a connection. Returns the user's identity only when this was
    /// their last live connection.
    pub fn unregister(&self, connection_id: &str) -> Option<UserIdentity> {
        let (_, session) = self.sessions.remove(connection_id)?;
        let left = self.detach(&session.user.id, connection_id);

        tracing::debug!(
            user_id = %session.user.id,
            connection_id = %connection_id,
            last_connection = left.is_some(),
            "Connection unregistered"
        );

        left
    }

    /// Drop `connection_id` from a user's connection set, removing the user
    /// entirely when it empties. The emptiness check and removal happen
    /// under the same entry lock.
    fn detach(&self, user_id: &str, connection_id: &str) -> Option<UserIdentity> {
        match self.online.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().connections.remove(connection_id);
                if entry.get().connections.is_empty() {
                    Some(entry.remove().identity)
                } else {
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// De-duplicated presence listing: one entry per online user, ordered by
    /// display name then id.
    pub fn presence(&self) -> Vec<UserIdentity> {
        let mut users: Vec<UserIdentity> = self
            .online
            .iter()
            .map(|entry| entry.value().identity.clone())
            .collect();
        users.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        users
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains_key(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Record that a connection joined a channel. False if it is not registered.
    pub fn record_join(&self, connection_id: &str, channel_id: &str) -> bool {
        match self.sessions.get_mut(connection_id) {
            Some(mut session) => {
                session.joined_channels.insert(channel_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn record_leave(&self, connection_id: &str, channel_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(connection_id) {
            session.joined_channels.remove(channel_id);
        }
    }

    /// Push an event to one connection. False if the connection is gone.
    pub fn send_to_connection(&self, connection_id: &str, event: ServerEvent) -> bool {
        match self.sessions.get(connection_id) {
            Some(session) => session.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Push an event to every connection of a user. Returns how many
    /// connections accepted it.
    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        let connection_ids = self.connections_for(user_id);
        connection_ids
            .iter()
            .filter(|id| self.send_to_connection(id, event.clone()))
            .count()
    }

    /// Push an event to every live connection.
    pub fn broadcast_to_all(&self, event: &ServerEvent) {
        for session in self.sessions.iter() {
            let _ = session.sender.send(event.clone());
        }
    }
}
