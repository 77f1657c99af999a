//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the socket I/O of a
//! session. All routing decisions are left to the [`RelayHub`].

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::connection::{Connection, Outbound, Transport};
use super::hub::{ConnectParams, RelayHub};
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// This is the entry point for realtime sessions. Role and identity come
/// from the query string (`type`, `deviceId`, `clientId`).
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, params))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>, params: ConnectParams) {
    let (mut sender, mut receiver) = socket.split();
    let (transport, mut rx) = Transport::channel();

    let connection = hub.open_session(params.classify(), transport);
    let session_id = connection.session_id();

    // Task to forward frames from the transport channel to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            tracing::debug!(
                                session_id,
                                "WebSocket send failed, closing connection"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize frame");
                    }
                },
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_for_recv = Arc::clone(&connection);

    // Task to receive frames from the socket and hand them to the hub
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &conn_for_recv, msg) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        session_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.close_session(&connection);
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(hub: &RelayHub, connection: &Connection, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            hub.handle_text(connection, &text);
            true
        }
        Message::Binary(_) => {
            tracing::debug!(
                identity = %connection.identity(),
                "Ignoring binary frame"
            );
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; either way the peer is alive
            connection.touch();
            true
        }
        Message::Close(_) => {
            tracing::debug!(identity = %connection.identity(), "Peer requested close");
            false
        }
    }
}
