//! WebSocket Message Types
//!
//! Defines all frames exchanged on a realtime session. Inbound frames are
//! tagged unions keyed by `type`, one enum per sender role; unrecognised
//! types land in the `Unknown` variant and are ignored by the router.
//! Every outbound frame is wrapped in a [`Frame`] which stamps it with an
//! ISO-8601 timestamp.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Keep an explicit `null` as `Some(Value::Null)`
///
/// Paired with `#[serde(default)]` so an absent field stays `None` and is
/// omitted again when relayed, while `null` is relayed as `null`.
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Messages sent from a device to the hub
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// A credential was provisioned on the device
    CredentialAdded {
        #[serde(default, deserialize_with = "present")]
        credential: Option<Value>,
    },
    /// A credential was deleted from the device
    CredentialRemoved {
        #[serde(default, rename = "credentialId", deserialize_with = "present")]
        credential_id: Option<Value>,
    },
    /// Device configuration changed
    ConfigChanged {
        #[serde(default, deserialize_with = "present")]
        config: Option<Value>,
    },
    /// Tamper, lockout and similar security notifications
    SecurityEvent {
        #[serde(default, deserialize_with = "present")]
        event: Option<Value>,
        #[serde(default, deserialize_with = "present")]
        severity: Option<Value>,
    },
    /// Device-side failure report
    Error {
        #[serde(default, deserialize_with = "present")]
        error: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Messages sent from a client to the hub
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the identities of all connected devices
    GetDevices,
    /// Relay a command to one device
    SendToDevice {
        #[serde(default, rename = "deviceId", deserialize_with = "present")]
        device_id: Option<Value>,
        #[serde(default, deserialize_with = "present")]
        command: Option<Value>,
        #[serde(default, deserialize_with = "present")]
        data: Option<Value>,
    },
    /// Acknowledged only; broadcasts are not filtered per subscription
    Subscribe {
        #[serde(default, deserialize_with = "present")]
        devices: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

impl DeviceMessage {
    /// Wire name of the message type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceMessage::CredentialAdded { .. } => "credential_added",
            DeviceMessage::CredentialRemoved { .. } => "credential_removed",
            DeviceMessage::ConfigChanged { .. } => "config_changed",
            DeviceMessage::SecurityEvent { .. } => "security_event",
            DeviceMessage::Error { .. } => "error",
            DeviceMessage::Unknown => "unknown",
        }
    }
}

impl ClientMessage {
    /// Wire name of the message type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::GetDevices => "get_devices",
            ClientMessage::SendToDevice { .. } => "send_to_device",
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Unknown => "unknown",
        }
    }
}

/// Messages sent from the hub to devices and clients
///
/// Optional payload fields that the sender omitted are omitted again on
/// the way out rather than serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent to a client right after it connects
    #[serde(rename_all = "camelCase")]
    Welcome {
        client_id: String,
        devices: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeviceConnected { device_id: String },
    #[serde(rename_all = "camelCase")]
    DeviceDisconnected { device_id: String },
    #[serde(rename_all = "camelCase")]
    CredentialAdded {
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        credential: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    CredentialRemoved {
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        credential_id: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ConfigChanged {
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    SecurityEvent {
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        severity: Option<Value>,
    },
    /// Either a relayed device error or a routing failure reported to a client
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
        /// Echoes whatever the client sent, string or not
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<Value>,
    },
    DevicesList { devices: Vec<String> },
    #[serde(rename_all = "camelCase")]
    ClientCommand {
        client_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    CommandSent { device_id: String },
    Subscribed {
        #[serde(skip_serializing_if = "Option::is_none")]
        devices: Option<Value>,
    },
    /// Control-plane notification unicast to a device
    Notification {
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Control-plane broadcast to every client
    Broadcast {
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Liveness probe
    Ping,
}

impl ServerMessage {
    /// Routing failure reply for a device that is absent or closed
    pub fn device_not_connected(device_id: Option<Value>) -> Self {
        ServerMessage::Error {
            error: Some(Value::String("Device not connected".to_string())),
            device_id,
        }
    }

    /// Wrap the message in a timestamped frame
    pub fn stamp(self) -> Frame {
        Frame {
            message: self,
            timestamp: iso_timestamp(),
        }
    }
}

/// A timestamped outbound frame, the unit written to a transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    #[serde(flatten)]
    pub message: ServerMessage,
    pub timestamp: String,
}

impl From<ServerMessage> for Frame {
    fn from(message: ServerMessage) -> Self {
        message.stamp()
    }
}

/// Current UTC time as ISO-8601 with millisecond precision
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
