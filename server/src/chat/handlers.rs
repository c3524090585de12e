//! REST read access to channel history.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::Message;
use crate::state::AppState;

/// Default page size for channel history.
pub const DEFAULT_LIMIT: usize = 50;
/// Maximum page size for channel history.
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub channel_id: String,
    pub messages: Vec<Message>,
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// GET /api/channels/{channel_id}/history?limit=N
/// Most recent messages, oldest first. Unknown channels have no history.
pub async fn get_history(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let messages = state
        .delivery
        .recent_history(&channel_id, clamp_limit(params.limit));
    Json(HistoryResponse {
        channel_id,
        messages,
    })
}
