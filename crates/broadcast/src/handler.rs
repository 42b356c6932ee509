//! WebSocket connection lifecycle.
//!
//! Every connection is registered under a generated default id as soon as
//! the upgrade completes, so a client that never identifies still receives
//! broadcasts and can request snapshots. An `identify` frame re-registers
//! the connection under the client's own id and is acknowledged with a
//! `connection` message; a `subscribe_job` frame answers with a one-shot
//! `job_status` snapshot, independent of the live stream.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use parallax_core::protocol::{ClientMessage, ServerMessage};
use parallax_core::types::JobId;

use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single connection after upgrade.
///
/// Splits the socket; a spawned sender task pumps frames from the registry
/// channel into the sink while the current task runs the receive loop. On
/// disconnect or receive error the connection is unregistered and the
/// sender task aborted.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut client_id = format!("client-{}", uuid::Uuid::new_v4());
    tracing::info!(client_id = %client_id, "WebSocket connected");

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.register(&client_id, tx.clone()).await;

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Identify {
                    client_id: requested,
                }) => {
                    // One-pass swap: no broadcast can deliver to this
                    // connection under both the generated and claimed ids.
                    state
                        .registry
                        .rename(&client_id, requested.clone(), tx.clone())
                        .await;
                    client_id = requested;
                    state
                        .registry
                        .send(&client_id, &ServerMessage::connected(client_id.clone()))
                        .await;
                    tracing::info!(client_id = %client_id, "Client identified");
                }
                Ok(ClientMessage::SubscribeJob { job_id }) => {
                    deliver_snapshot(&state, &client_id, &job_id).await;
                }
                Err(err) => {
                    // Unknown frames are ignored so a confused client can
                    // never wedge the protocol.
                    tracing::warn!(
                        client_id = %client_id,
                        error = %err,
                        "Ignoring malformed client frame"
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(client_id = %client_id, "Pong received");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(client_id = %client_id, error = %err, "WebSocket receive error");
                break;
            }
        }
    }

    state.registry.unregister(&client_id).await;
    send_task.abort();
    tracing::info!(client_id = %client_id, "WebSocket disconnected");
}

/// Answer `subscribe_job` with the current store record, if one exists.
async fn deliver_snapshot(state: &AppState, client_id: &str, job_id: &JobId) {
    match state.broker.get(job_id).await {
        Ok(Some(record)) => {
            state
                .registry
                .send(client_id, &ServerMessage::job_status(record))
                .await;
            tracing::debug!(client_id = %client_id, job_id = %job_id, "Snapshot delivered");
        }
        Ok(None) => {
            tracing::debug!(
                client_id = %client_id,
                job_id = %job_id,
                "Snapshot requested for unknown job"
            );
        }
        Err(err) => {
            tracing::error!(
                client_id = %client_id,
                job_id = %job_id,
                error = %err,
                "Failed to read job record for snapshot"
            );
        }
    }
}
