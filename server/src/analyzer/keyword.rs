use async_trait::async_trait;
use std::collections::BTreeSet;

use super::{AnalyzerError, CompatibilityAnalyzer, RankedMatch};
use crate::models::UserIdentity;

const STOP_WORDS: &[&str] = &[
    "and", "the", "for", "with", "you", "are", "but", "not", "love", "like", "really", "into",
    "about", "from", "that", "this", "have", "all", "very", "who", "what",
];

/// Offline analyzer scoring bio keyword overlap on a 1-10 scale.
///
/// Used when no remote analyzer is configured. Results come back in
/// candidate order, so equal scores resolve to the earlier candidate.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

fn keywords(bio: &str) -> BTreeSet<String> {
    bio.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn score(shared: usize, union: usize) -> f64 {
    if union == 0 {
        return 1.0;
    }
    let ratio = shared as f64 / union as f64;
    (1.0 + 9.0 * ratio).round()
}

#[async_trait]
impl CompatibilityAnalyzer for KeywordAnalyzer {
    async fn rank(
        &self,
        user: &UserIdentity,
        candidates: &[UserIdentity],
    ) -> Result<Vec<RankedMatch>, AnalyzerError> {
        let mine = keywords(&user.bio);

        Ok(candidates
            .iter()
            .map(|candidate| {
                let theirs = keywords(&candidate.bio);
                let shared: Vec<&String> = mine.intersection(&theirs).collect();
                let union = mine.union(&theirs).count();
                let reasoning = if shared.is_empty() {
                    "No shared interests found in bios".to_string()
                } else {
                    format!(
                        "Shared interests: {}",
                        shared.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    )
                };
                RankedMatch {
                    candidate_id: candidate.id.clone(),
                    score: score(shared.len(), union),
                    reasoning,
                }
            })
            .collect())
    }

    async fn generate_icebreaker(
        &self,
        from: &UserIdentity,
        to: &UserIdentity,
    ) -> Result<String, AnalyzerError> {
        let mine = keywords(&from.bio);
        let theirs = keywords(&to.bio);

        Ok(match mine.intersection(&theirs).next() {
            Some(topic) => format!(
                "Hey {}! Looks like we're both into {}, want to swap stories?",
                to.display_name, topic
            ),
            None => format!(
                "Hey {}! I noticed your profile and thought we should connect!",
                to.display_name
            ),
        })
    }
}
