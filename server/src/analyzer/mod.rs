//! Compatibility analysis: ranks candidate matches for a user and writes
//! icebreaker text for a chosen pair.
//!
//! The analyzer is an external collaborator. Timeouts are its own concern;
//! the match sweep only sees success or `AnalyzerError`.

pub mod keyword;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{UserId, UserIdentity};

pub use keyword::KeywordAnalyzer;
pub use openai::OpenAiAnalyzer;

/// One ranked candidate for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    #[serde(alias = "userId")]
    pub candidate_id: UserId,
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analyzer returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CompatibilityAnalyzer: Send + Sync {
    /// Rank `candidates` for `user`, best first or in any order; the caller
    /// picks the highest score.
    async fn rank(
        &self,
        user: &UserIdentity,
        candidates: &[UserIdentity],
    ) -> Result<Vec<RankedMatch>, AnalyzerError>;

    /// Opening line from `from` to `to`.
    async fn generate_icebreaker(
        &self,
        from: &UserIdentity,
        to: &UserIdentity,
    ) -> Result<String, AnalyzerError>;
}

/// Highest-scoring match. On equal scores the earliest entry wins.
pub fn best_match(matches: &[RankedMatch]) -> Option<&RankedMatch> {
    let mut iter = matches.iter();
    let mut best = iter.next()?;
    for candidate in iter {
        if candidate.score > best.score {
            best = candidate;
        }
    }
    Some(best)
}
