//! WebSocket subscriber endpoint.
//!
//! `GET /ws/updates` upgrades the connection and registers it with the
//! event hub. The stream is upstream-only: inbound frames are drained and
//! ignored. A subscriber that fails a write, lags past its buffer, or
//! closes its side is silently unregistered.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::state::AppState;

/// GET /ws/updates
pub async fn updates(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| serve(state, socket))
}

async fn serve(state: AppState, socket: WebSocket) {
    let mut events = state.hub.subscribe();
    let (mut sink, mut stream) = socket.split();
    debug!("websocket subscriber connected");

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                // Fell too far behind its buffer; drop rather than block
                // producers.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket subscriber lagged, dropping");
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            inbound = stream.next() => match inbound {
                // Upstream-only: ignore whatever the client sends.
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    debug!("websocket subscriber disconnected");
}
