//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::{DeviceDescriptor, DeviceSummary};

// ============================================
// DEVICE DTOs
// ============================================

/// Device registration request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    /// Device identity; required, validated by the handler
    #[serde(default)]
    pub device_id: Option<String>,
    /// Free-form device metadata
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Device registration response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceResponse {
    pub success: bool,
    pub device: DeviceDescriptor,
    /// Endpoint for the device's realtime session
    pub ws_url: String,
}

/// Connected devices
#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceSummary>,
}

// ============================================
// EVENT DTOs
// ============================================

/// Event payload for notify and broadcast
#[derive(Debug, Default, Deserialize)]
pub struct EventRequest {
    #[serde(default, deserialize_with = "crate::websocket::present")]
    pub event: Option<Value>,
    #[serde(default, deserialize_with = "crate::websocket::present")]
    pub data: Option<Value>,
}

/// Notify response
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub sent: bool,
}

/// Broadcast response
#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    /// Clients the frame was handed to
    pub sent: usize,
    /// Clients tracked at the time of the broadcast
    pub recipients: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests
    pub status: String,
    /// ISO-8601 time of the check
    pub timestamp: String,
    /// Connected devices
    pub devices: usize,
    /// Connected clients
    pub clients: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
