use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::chat::{handlers as chat_handlers, ChannelSummary};
use crate::dm::handlers as dm_handlers;
use crate::matching::handlers as matching_handlers;
use crate::presence::handlers as presence_handlers;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub channels: Vec<ChannelSummary>,
    pub private_conversations: usize,
    pub online_users: usize,
    pub total_connections: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// GET /api/health: Channel and connection counters.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let delivery = &state.delivery;
    Json(HealthResponse {
        status: "OK",
        channels: delivery.channels().stats(),
        private_conversations: delivery.conversations().conversation_count(),
        online_users: delivery.presence().len(),
        total_connections: delivery.registry().connection_count(),
        timestamp: chrono::Utc::now(),
    })
}

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/api/health", get(health))
        .route("/api/presence", get(presence_handlers::get_presence))
        .route(
            "/api/channels/{channel_id}/history",
            get(chat_handlers::get_history),
        )
        .route(
            "/api/conversations/{user_a}/{user_b}",
            get(dm_handlers::get_conversation),
        )
        .route("/api/daily-match", get(matching_handlers::get_status))
        .route(
            "/api/daily-match/trigger",
            axum::routing::post(matching_handlers::trigger_now),
        )
        .route(
            "/api/daily-match/schedule",
            axum::routing::put(matching_handlers::reschedule),
        )
        .with_state(state)
}
