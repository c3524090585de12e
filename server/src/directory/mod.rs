//! User directory: the external system of record for user identities.
//!
//! The core only ever reads from it. Every lookup goes back to the directory
//! so profile edits are picked up on the next register or send.

pub mod json_file;
pub mod memory;

use async_trait::async_trait;

use crate::models::UserIdentity;

pub use json_file::JsonFileDirectory;
pub use memory::InMemoryDirectory;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read user records: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed user records: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserIdentity>, DirectoryError>;

    async fn list_all(&self) -> Result<Vec<UserIdentity>, DirectoryError>;
}
