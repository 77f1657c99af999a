//! Broadcast Route
//!
//! - POST /api/broadcast - Send an event to every connected client

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{BroadcastResponse, EventRequest};
use crate::api::state::AppState;

/// POST /api/broadcast
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    body: Option<Json<EventRequest>>,
) -> Json<BroadcastResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let delivery = state
        .control
        .broadcast_to_clients(request.event, request.data);

    Json(BroadcastResponse {
        success: true,
        sent: delivery.sent,
        recipients: delivery.recipients,
    })
}
