use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::error::CoreError;
use crate::events::ServerEvent;
use crate::state::AppState;
use crate::ws::protocol;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent when the user id does not resolve in the directory.
pub const CLOSE_USER_NOT_FOUND: u16 = 4004;
/// Close code sent when the directory could not be consulted.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Run the actor-per-connection pattern for a WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards core events (as JSON) and control
///   frames from two mpsc channels
/// - Reader loop: processes incoming frames, dispatches to protocol handlers
///
/// The event sender is what the core stores in the connection registry, so
/// any part of the system can push to this client.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Message>();

    // Register; identity always comes from the directory
    let identity = match state
        .delivery
        .connect(&connection_id, &user_id, tx.clone())
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            let (code, reason) = match e {
                CoreError::UserNotFound(_) => (CLOSE_USER_NOT_FOUND, "User not found"),
                _ => (CLOSE_INTERNAL_ERROR, "Registration failed"),
            };
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                close_code = code,
                "WebSocket registration failed"
            );
            let _ = ws_sender
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })))
                .await;
            return;
        }
    };

    tracing::info!(
        user_id = %identity.id,
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards events and control frames to the sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, control_rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = control_tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(
                        text.as_str(),
                        &tx,
                        &state,
                        &connection_id,
                        &identity.id,
                    )
                    .await;
                }
                Message::Binary(data) => {
                    // Commands are JSON text frames
                    tracing::debug!(
                        user_id = %identity.id,
                        bytes = data.len(),
                        "Received binary frame (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = control_tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %identity.id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %identity.id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %identity.id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Leave is announced only if this was the user's last connection
    state.delivery.disconnect(&connection_id);

    tracing::info!(
        user_id = %identity.id,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: serializes core events and forwards them, along with control
/// frames, to the WebSocket sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut control: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let msg = tokio::select! {
            Some(event) = events.recv() => match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode server event");
                    continue;
                }
            },
            Some(frame) = control.recv() => frame,
            else => break,
        };

        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
