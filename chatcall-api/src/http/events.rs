//! WebSocket endpoint for call event delivery
//!
//! One connection per client. The socket is registered with the event hub
//! under both of the identity's addresses, and every `CallEvent` routed to
//! either address is pushed as a JSON text frame. Delivery is best-effort:
//! whatever fires while a user is disconnected is gone.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info};

use chatcall_core::models::{ConnectionId, Identity};

use crate::http::{AppError, AppState};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: Option<String>,
}

/// WebSocket handler for call lifecycle events
///
/// Clients provide the JWT via query parameter:
/// `ws://host/api/events/ws?token={jwt}`
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    // Validate the JWT before upgrading
    let token = query
        .token
        .ok_or_else(|| AppError::unauthorized("Missing token query parameter"))?;

    let claims = state
        .jwt_service
        .verify_token(&token)
        .map_err(|e| AppError::unauthorized(format!("Invalid token: {e}")))?;

    let identity = claims.identity();

    // Limit max message size to 64KB; inbound frames carry nothing anyway
    Ok(ws
        .max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, state: AppState, identity: Identity) {
    let connection_id = ConnectionId::new();
    let mut events = state.hub.subscribe(&identity, connection_id.clone());

    info!(
        "WebSocket connection established: user={}, connection={}",
        identity.username,
        connection_id.as_str()
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                // None means the hub dropped this connection's sender
                let Some(event) = event else { break };

                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode call event: {}", e);
                        continue;
                    }
                };

                if ws_sender
                    .send(axum::extract::ws::Message::Text(frame.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(axum::extract::ws::Message::Close(_))) | Some(Err(_)) | None => break,
                    // This channel only pushes events; inbound frames are ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unsubscribe(&connection_id);

    info!(
        "WebSocket connection closed: user={}, connection={}",
        identity.username,
        connection_id.as_str()
    );
}
