use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{AnalyzerError, CompatibilityAnalyzer, RankedMatch};
use crate::config::AnalyzerConfig;
use crate::models::UserIdentity;

const RANK_MAX_TOKENS: u32 = 500;
const ICEBREAKER_MAX_TOKENS: u32 = 50;

/// Analyzer backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RankPayload {
    Wrapped { matches: Vec<RankedMatch> },
    Bare(Vec<RankedMatch>),
}

impl OpenAiAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AnalyzerError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AnalyzerError::InvalidResponse("no choices returned".to_string()))
    }
}

fn rank_prompt(user: &UserIdentity, candidates: &[UserIdentity]) -> String {
    let listing: Vec<String> = candidates
        .iter()
        .map(|c| format!("- {} (id {}): \"{}\"", c.display_name, c.id, bio_or_default(c)))
        .collect();

    format!(
        "Analyze these user profiles and find the best 3 matches for {name}.\n\
         Current user bio: \"{bio}\"\n\n\
         Other users:\n{listing}\n\n\
         Return only JSON: {{\"matches\": [{{\"userId\": \"id\", \"score\": 8, \"reasoning\": \"why they match\"}}]}} \
         with scores from 1 to 10.",
        name = user.display_name,
        bio = bio_or_default(user),
        listing = listing.join("\n"),
    )
}

fn icebreaker_prompt(from: &UserIdentity, to: &UserIdentity) -> String {
    format!(
        "Create a friendly icebreaker message from {a} to {b}.\n\
         {a}'s bio: \"{a_bio}\"\n\
         {b}'s bio: \"{b_bio}\"\n\
         Make it natural and engaging (max 100 chars).",
        a = from.display_name,
        b = to.display_name,
        a_bio = bio_or_default(from),
        b_bio = bio_or_default(to),
    )
}

fn bio_or_default(user: &UserIdentity) -> &str {
    if user.bio.trim().is_empty() {
        "No bio provided"
    } else {
        &user.bio
    }
}

/// Parse a ranking reply. Models often wrap JSON in a fenced code block.
pub(crate) fn parse_rank_reply(content: &str) -> Result<Vec<RankedMatch>, AnalyzerError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let payload: RankPayload = serde_json::from_str(body)
        .map_err(|e| AnalyzerError::InvalidResponse(format!("ranking is not valid JSON: {e}")))?;

    Ok(match payload {
        RankPayload::Wrapped { matches } => matches,
        RankPayload::Bare(matches) => matches,
    })
}

#[async_trait]
impl CompatibilityAnalyzer for OpenAiAnalyzer {
    async fn rank(
        &self,
        user: &UserIdentity,
        candidates: &[UserIdentity],
    ) -> Result<Vec<RankedMatch>, AnalyzerError> {
        let reply = self.complete(&rank_prompt(user, candidates), RANK_MAX_TOKENS).await?;
        parse_rank_reply(&reply)
    }

    async fn generate_icebreaker(
        &self,
        from: &UserIdentity,
        to: &UserIdentity,
    ) -> Result<String, AnalyzerError> {
        let reply = self
            .complete(&icebreaker_prompt(from, to), ICEBREAKER_MAX_TOKENS)
            .await?;
        let text = reply.trim().trim_matches('"').trim();
        if text.is_empty() {
            return Err(AnalyzerError::InvalidResponse("empty icebreaker".to_string()));
        }
        Ok(text.to_string())
    }
}
