// =============================================================================
// WebSocket Handler — push-based state updates
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>` and receive:
//   1. An immediate `full_state` message on connect.
//   2. A fresh `full_state` whenever the state_version changes (checked every
//      500 ms).
//   3. An `alert` message for every alert-engine emission, as it happens.
//
// Message envelope: `{ "type": "full_state" | "alert", "data": ... }`.
// Ping frames are answered with Pong; cleanup runs on disconnect.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("WebSocket connection rejected: invalid token");
        return (
            axum::http::StatusCode::FORBIDDEN,
            "Invalid or missing token",
        )
            .into_response();
    }

    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

/// One connection lifetime: push loop + recv loop via `tokio::select!`.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    use futures_util::{SinkExt, StreamExt};

    let mut alert_rx = state.alert_tx.subscribe();

    // Initial full snapshot.
    if let Err(e) = send_full_state(&mut sender, &state).await {
        warn!(error = %e, "failed to send initial WebSocket snapshot");
        return;
    }
    let mut last_sent_version = state.current_state_version();

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            // ── Push loop: snapshot on version change ───────────────────
            _ = push_interval.tick() => {
                let current = state.current_state_version();
                if current != last_sent_version {
                    match send_full_state(&mut sender, &state).await {
                        Ok(()) => last_sent_version = current,
                        Err(e) => {
                            debug!(error = %e, "WebSocket send failed — disconnecting");
                            break;
                        }
                    }
                }
            }

            // ── Alert fan-out ───────────────────────────────────────────
            alert = alert_rx.recv() => {
                match alert {
                    Ok(alert) => {
                        let envelope = serde_json::json!({ "type": "alert", "data": alert });
                        if sender.send(Message::Text(envelope.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // Slow consumer: the next full_state carries the ring.
                        debug!(missed, "WebSocket client lagged on alerts");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            // ── Recv loop ───────────────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!(msg = %text, "WebSocket text message (heartbeat)");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket close frame received");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("WebSocket binary message ignored");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Serialise and send a `full_state` envelope, bumping the sequence number.
async fn send_full_state<S>(sender: &mut S, state: &Arc<AppState>) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    use futures_util::SinkExt;

    state
        .ws_sequence_number
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let snapshot = state.build_snapshot();
    let version = snapshot.state_version;
    let envelope = serde_json::json!({ "type": "full_state", "data": snapshot });

    match serde_json::to_string(&envelope) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(version, "WebSocket snapshot sent");
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; stay connected.
            warn!(error = %e, "failed to serialise snapshot");
            Ok(())
        }
    }
}
