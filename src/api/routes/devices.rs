//! Device Routes
//!
//! - POST /api/devices/register - Validate a device and hand out its endpoint
//! - GET /api/devices - List connected devices
//! - POST /api/devices/:id/notify - Unicast a notification to one device

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    DeviceListResponse, EventRequest, NotifyResponse, RegisterDeviceRequest,
    RegisterDeviceResponse,
};
use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// POST /api/devices/register
///
/// Returns 400 when `deviceId` is missing. A missing or unparseable body
/// counts as a missing `deviceId`.
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RegisterDeviceRequest>>,
) -> ApiResult<Json<RegisterDeviceResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let registration = state
        .control
        .register_device(request.device_id.as_deref(), request.metadata)?;

    Ok(Json(RegisterDeviceResponse {
        success: true,
        device: registration.device,
        ws_url: registration.ws_url,
    }))
}

/// GET /api/devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<DeviceListResponse> {
    Json(DeviceListResponse {
        devices: state.control.list_devices(),
    })
}

/// POST /api/devices/:id/notify
///
/// Returns 404 when the device has no open session; nothing is queued.
pub async fn notify_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: Option<Json<EventRequest>>,
) -> ApiResult<Json<NotifyResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    state
        .control
        .notify_device(&device_id, request.event, request.data)?;

    Ok(Json(NotifyResponse {
        success: true,
        sent: true,
    }))
}
