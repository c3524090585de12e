use async_trait::async_trait;
use std::sync::RwLock;

use super::{DirectoryError, UserDirectory};
use crate::models::UserIdentity;

/// In-process directory, kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<Vec<UserIdentity>>,
}

impl InMemoryDirectory {
    pub fn new(users: Vec<UserIdentity>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    /// Insert a user, or replace the record with the same id in place.
    pub fn upsert(&self, user: UserIdentity) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
    }

    pub fn remove(&self, id: &str) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.retain(|u| u.id != id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserIdentity>, DirectoryError> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<UserIdentity>, DirectoryError> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        Ok(users.clone())
    }
}
