use axum::http::StatusCode;

use crate::analyzer::AnalyzerError;
use crate::directory::DirectoryError;
use crate::models::{ConnectionId, UserId};

/// Errors surfaced by the coordination core.
///
/// No variant is fatal to the process. Unknown channels are created on
/// demand and an offline recipient is not an error, so neither has a variant.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("connection not registered: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("user directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("compatibility analyzer failed: {0}")]
    AnalyzerFailure(#[from] AnalyzerError),

    #[error("a match sweep is already running")]
    SweepInProgress,
}

impl CoreError {
    /// HTTP status used when the error reaches a REST handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::UserNotFound(_) | CoreError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::SweepInProgress => StatusCode::CONFLICT,
            CoreError::Directory(_) | CoreError::AnalyzerFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
