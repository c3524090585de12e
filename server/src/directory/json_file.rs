use async_trait::async_trait;
use std::path::PathBuf;

use super::{DirectoryError, UserDirectory};
use crate::models::UserIdentity;

/// Directory backed by a flat JSON array of user records.
///
/// The file is owned by the registration service; it is re-read on every
/// call and never written here. A missing file reads as an empty directory.
#[derive(Debug, Clone)]
pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<UserIdentity>, DirectoryError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Users file not found, directory is empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl UserDirectory for JsonFileDirectory {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserIdentity>, DirectoryError> {
        Ok(self.load().await?.into_iter().find(|u| u.id == id))
    }

    async fn list_all(&self) -> Result<Vec<UserIdentity>, DirectoryError> {
        self.load().await
    }
}
