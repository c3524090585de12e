use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// Authentication happens upstream; the user id is resolved against the
/// directory once the socket is open.
#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    pub user_id: String,
}

/// GET /ws?user_id=ID
/// WebSocket upgrade endpoint. Spawns an actor for the connection, which
/// closes with code 4004 if the user is unknown.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(user_id = %params.user_id, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, params.user_id))
}
