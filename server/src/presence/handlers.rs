use axum::{extract::State, Json};

use crate::models::UserIdentity;
use crate::state::AppState;

/// GET /api/presence: Online users, one entry per user however many
/// connections they hold.
pub async fn get_presence(State(state): State<AppState>) -> Json<Vec<UserIdentity>> {
    Json(state.delivery.presence())
}
