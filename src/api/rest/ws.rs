use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| stream_claims(socket, state))
}

/// Pushes every new or updated claim to the client as JSON.
async fn stream_claims(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.claim_events_tx.subscribe();

    info!("claim stream client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let claim = match rx.recv().await {
                Ok(claim) => claim,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "claim stream client lagging; events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&claim) {
                Ok(json) => json,
                Err(err) => {
                    warn!(claim_id = %claim.id, error = %err, "failed to serialize claim for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("claim stream client disconnected");
}
