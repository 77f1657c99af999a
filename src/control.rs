//! Control-Plane Bridge
//!
//! Synchronous request/response operations for operators and dashboards:
//! device registration, discovery, notification and broadcast. These read
//! the hub's registry and call the router's send primitives directly,
//! without going through a realtime session.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::websocket::{iso_timestamp, Delivery, RelayHub, Role, ServerMessage};

/// Descriptor returned when a device registers over the control plane
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub id: String,
    pub metadata: Value,
    pub registered_at: String,
    pub last_seen: String,
}

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub device: DeviceDescriptor,
    /// Endpoint the device should open its realtime session against
    pub ws_url: String,
}

/// A connected device as reported by [`ControlPlane::list_devices`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub id: String,
    pub last_seen: String,
}

/// Errors reported by control-plane operations
#[derive(Debug, Error, PartialEq)]
pub enum BridgeError {
    #[error("Device ID required")]
    MissingDeviceId,

    #[error("Device not connected")]
    DeviceNotConnected(String),
}

/// Out-of-band operations on the relay hub
pub struct ControlPlane {
    hub: Arc<RelayHub>,
    ws_url: String,
}

impl ControlPlane {
    pub fn new(hub: Arc<RelayHub>, ws_url: impl Into<String>) -> Self {
        Self {
            hub,
            ws_url: ws_url.into(),
        }
    }

    /// Validate a registration request and describe where to connect
    ///
    /// The registry is untouched; the device appears there once its
    /// realtime session opens.
    pub fn register_device(
        &self,
        device_id: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<Registration, BridgeError> {
        let device_id = device_id
            .filter(|id| !id.is_empty())
            .ok_or(BridgeError::MissingDeviceId)?;

        let now = iso_timestamp();
        let device = DeviceDescriptor {
            id: device_id.to_string(),
            metadata: metadata.unwrap_or_else(|| Value::Object(Map::new())),
            registered_at: now.clone(),
            last_seen: now,
        };

        tracing::info!(device_id = %device.id, "Device registered via control plane");

        Ok(Registration {
            device,
            ws_url: self.ws_url.clone(),
        })
    }

    /// Snapshot of connected devices
    pub fn list_devices(&self) -> Vec<DeviceSummary> {
        self.hub
            .registry()
            .snapshot(Role::Device)
            .into_iter()
            .map(|device| DeviceSummary {
                id: device.identity().to_string(),
                last_seen: device
                    .last_seen()
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            })
            .collect()
    }

    /// Unicast a `notification` frame to one device
    ///
    /// Fails without retry or queuing when the device is absent or closed.
    pub fn notify_device(
        &self,
        device_id: &str,
        event: Option<Value>,
        data: Option<Value>,
    ) -> Result<(), BridgeError> {
        let delivered = self.hub.router().send_to(
            Role::Device,
            device_id,
            ServerMessage::Notification { event, data },
        );

        if delivered {
            Ok(())
        } else {
            tracing::debug!(device_id = %device_id, "Notification target not connected");
            Err(BridgeError::DeviceNotConnected(device_id.to_string()))
        }
    }

    /// Send a `broadcast` frame to every open client
    pub fn broadcast_to_clients(&self, event: Option<Value>, data: Option<Value>) -> Delivery {
        let delivery = self
            .hub
            .router()
            .broadcast_to_clients(ServerMessage::Broadcast { event, data });

        tracing::info!(
            sent = delivery.sent,
            recipients = delivery.recipients,
            "Control-plane broadcast"
        );
        delivery
    }
}
