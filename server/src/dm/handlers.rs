use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::models::PrivateMessage;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation_key: String,
    pub messages: Vec<PrivateMessage>,
}

/// GET /api/conversations/{user_a}/{user_b}
/// Retained thread for the pair, in either argument order.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(String, String)>,
) -> Json<ConversationResponse> {
    Json(ConversationResponse {
        conversation_key: super::ConversationKey::new(&user_a, &user_b).to_string(),
        messages: state.delivery.conversation_history(&user_a, &user_b),
    })
}
