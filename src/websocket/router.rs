//! Message Router
//!
//! Classifies inbound application messages by role and `type` and executes
//! the matching routing action. The router only reads the registry to
//! resolve destinations; it never mutates it.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::connection::{Connection, Role};
use super::messages::{ClientMessage, DeviceMessage, ServerMessage};
use super::registry::Registry;

/// Outcome of a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Transports that accepted the frame
    pub sent: usize,
    /// Entries tracked at the time of the fan-out
    pub recipients: usize,
}

/// Routes messages between devices and clients
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: Arc<Registry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Send one message to every open client
    ///
    /// The frame is stamped once so all recipients see the same timestamp.
    pub fn broadcast_to_clients(&self, message: ServerMessage) -> Delivery {
        let frame = message.stamp();
        let clients = self.registry.snapshot(Role::Client);
        let recipients = clients.len();

        let sent = clients
            .iter()
            .filter(|client| client.is_open() && client.send_frame(frame.clone()))
            .count();

        tracing::trace!(sent, recipients, "Broadcast to clients");

        Delivery { sent, recipients }
    }

    /// Send one message to a single connection, if present and open
    pub fn send_to(&self, role: Role, identity: &str, message: ServerMessage) -> bool {
        match self.registry.lookup(role, identity) {
            Some(connection) if connection.is_open() => connection.send(message),
            _ => false,
        }
    }

    /// Execute the routing action for a message sent by a device
    pub fn route_device_message(&self, device: &Connection, message: DeviceMessage) {
        let device_id = device.identity().to_string();

        let outbound = match message {
            DeviceMessage::CredentialAdded { credential } => ServerMessage::CredentialAdded {
                device_id,
                credential,
            },
            DeviceMessage::CredentialRemoved { credential_id } => {
                ServerMessage::CredentialRemoved {
                    device_id,
                    credential_id,
                }
            }
            DeviceMessage::ConfigChanged { config } => {
                ServerMessage::ConfigChanged { device_id, config }
            }
            DeviceMessage::SecurityEvent { event, severity } => ServerMessage::SecurityEvent {
                device_id,
                event,
                severity,
            },
            DeviceMessage::Error { error } => ServerMessage::Error {
                error,
                device_id: Some(Value::String(device_id)),
            },
            DeviceMessage::Unknown => {
                tracing::trace!(identity = %device.identity(), "Ignoring unknown device message");
                return;
            }
        };

        self.broadcast_to_clients(outbound);
    }

    /// Execute the routing action for a message sent by a client
    ///
    /// Replies go to the sending session itself.
    pub fn route_client_message(&self, client: &Connection, message: ClientMessage) {
        match message {
            ClientMessage::GetDevices => {
                client.send(ServerMessage::DevicesList {
                    devices: self.registry.list_identities(Role::Device),
                });
            }
            ClientMessage::SendToDevice {
                device_id,
                command,
                data,
            } => {
                // only string identities can name a device
                let target = device_id.as_ref().and_then(Value::as_str);
                let delivered = target.is_some_and(|id| {
                    self.send_to(
                        Role::Device,
                        id,
                        ServerMessage::ClientCommand {
                            client_id: client.identity().to_string(),
                            command,
                            data,
                        },
                    )
                });

                let reply = match target {
                    Some(id) if delivered => ServerMessage::CommandSent {
                        device_id: id.to_string(),
                    },
                    _ => {
                        tracing::debug!(
                            identity = %client.identity(),
                            device_id = ?device_id,
                            "Command target not connected"
                        );
                        ServerMessage::device_not_connected(device_id.clone())
                    }
                };
                client.send(reply);
            }
            ClientMessage::Subscribe { devices } => {
                client.send(ServerMessage::Subscribed { devices });
            }
            ClientMessage::Unknown => {
                tracing::trace!(identity = %client.identity(), "Ignoring unknown client message");
            }
        }
    }
}
