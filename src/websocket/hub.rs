//! Relay Hub
//!
//! Owns the connection registry, the message router and the liveness
//! monitor, and drives each session through its lifecycle:
//!
//! - open: classify, register, arm the probe, announce (`device_connected`
//!   to clients, or `welcome` to the new client)
//! - frames: parse per role and hand to the router
//! - close: cancel the probe, remove, announce (`device_disconnected`)

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::connection::{Connection, ConnectionState, Role, Transport};
use super::messages::{ClientMessage, DeviceMessage, ServerMessage};
use super::monitor::LivenessMonitor;
use super::registry::Registry;
use super::router::MessageRouter;

/// Configuration for the relay hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Interval between liveness probes
    pub probe_interval: Duration,
    /// Evict after this many unanswered probes; 0 disables eviction
    pub max_missed_probes: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            max_missed_probes: 0,
        }
    }
}

/// Query parameters supplied when opening a realtime session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectParams {
    /// `device` or `client`; anything else is a client
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<String>,
    #[serde(default, rename = "clientId")]
    pub client_id: Option<String>,
}

impl ConnectParams {
    /// Decide the role and identity of the session
    ///
    /// A `device` session without a device id is treated as a client.
    /// Clients without an id get a generated one.
    pub fn classify(self) -> SessionIdentity {
        let client_id = self.client_id.filter(|id| !id.is_empty());
        let device_id = self.device_id.filter(|id| !id.is_empty());

        match (self.kind.as_deref(), device_id) {
            (Some("device"), Some(device_id)) => SessionIdentity::device(device_id, client_id),
            _ => SessionIdentity::client(client_id.unwrap_or_else(generate_client_id)),
        }
    }
}

/// Role and identity a session registers under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub role: Role,
    pub identity: String,
    pub origin: Option<String>,
}

impl SessionIdentity {
    pub fn device(identity: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            role: Role::Device,
            identity: identity.into(),
            origin,
        }
    }

    pub fn client(identity: impl Into<String>) -> Self {
        Self {
            role: Role::Client,
            identity: identity.into(),
            origin: None,
        }
    }
}

/// Time-based client identity with a random suffix
pub fn generate_client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("client_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Routes events between devices and clients
pub struct RelayHub {
    registry: Arc<Registry>,
    router: MessageRouter,
    monitor: LivenessMonitor,
}

impl RelayHub {
    /// Create a new relay hub
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            router: MessageRouter::new(Arc::clone(&registry)),
            monitor: LivenessMonitor::new(config.probe_interval, config.max_missed_probes),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Register a freshly accepted session and arm its liveness probe
    ///
    /// Must be called from within a tokio runtime.
    pub fn open_session(
        self: &Arc<Self>,
        session: SessionIdentity,
        transport: Transport,
    ) -> Arc<Connection> {
        let SessionIdentity {
            role,
            identity,
            origin,
        } = session;
        let connection = Connection::new(role, identity, origin, transport);

        match role {
            Role::Device => {
                let router = &self.router;
                self.registry.register_with(Arc::clone(&connection), |device| {
                    router.broadcast_to_clients(ServerMessage::DeviceConnected {
                        device_id: device.identity().to_string(),
                    })
                });
            }
            Role::Client => {
                // welcome must be the client's first frame
                self.registry
                    .register_client_with(Arc::clone(&connection), |client, devices| {
                        client.send(ServerMessage::Welcome {
                            client_id: client.identity().to_string(),
                            devices,
                        })
                    });
            }
        }

        tracing::info!(
            role = %role,
            identity = %connection.identity(),
            origin = ?connection.origin(),
            session_id = connection.session_id(),
            "Session opened"
        );

        self.monitor.watch(Arc::clone(self), Arc::clone(&connection));
        connection
    }

    /// Handle one inbound text frame
    ///
    /// Malformed frames are logged and dropped; the session stays open but
    /// its liveness is not refreshed.
    pub fn handle_text(&self, connection: &Connection, text: &str) {
        if connection.state() != ConnectionState::Open {
            return;
        }

        match connection.role() {
            Role::Device => match serde_json::from_str::<DeviceMessage>(text) {
                Ok(message) => {
                    connection.touch();
                    tracing::debug!(
                        identity = %connection.identity(),
                        message_type = message.kind(),
                        "Device message"
                    );
                    self.router.route_device_message(connection, message);
                }
                Err(e) => {
                    tracing::debug!(
                        identity = %connection.identity(),
                        error = %e,
                        text = %text,
                        "Invalid device message"
                    );
                }
            },
            Role::Client => match serde_json::from_str::<ClientMessage>(text) {
                Ok(message) => {
                    connection.touch();
                    tracing::debug!(
                        identity = %connection.identity(),
                        message_type = message.kind(),
                        "Client message"
                    );
                    self.router.route_client_message(connection, message);
                }
                Err(e) => {
                    tracing::debug!(
                        identity = %connection.identity(),
                        error = %e,
                        text = %text,
                        "Invalid client message"
                    );
                }
            },
        }
    }

    /// Tear down a session. Idempotent.
    ///
    /// Only the session currently registered under the identity is removed,
    /// so a superseded session closing late leaves its successor alone.
    pub fn close_session(&self, connection: &Connection) {
        connection.cancel_probe();
        connection.close();

        let router = &self.router;
        let removed = self.registry.remove_session_with(connection, |removed| {
            if removed.role() == Role::Device {
                router.broadcast_to_clients(ServerMessage::DeviceDisconnected {
                    device_id: removed.identity().to_string(),
                });
            }
        });

        if removed.is_some() {
            tracing::info!(
                role = %connection.role(),
                identity = %connection.identity(),
                session_id = connection.session_id(),
                "Session closed"
            );
        }
    }

    /// Close every session; clients first so device departures go unannounced
    pub fn shutdown(&self) {
        for role in [Role::Client, Role::Device] {
            for connection in self.registry.snapshot(role) {
                self.close_session(&connection);
            }
        }
        tracing::info!("Relay hub shut down");
    }

    pub fn device_count(&self) -> usize {
        self.registry.len(Role::Device)
    }

    pub fn client_count(&self) -> usize {
        self.registry.len(Role::Client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Outbound;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn hub() -> Arc<RelayHub> {
        Arc::new(RelayHub::new(HubConfig::default()))
    }

    fn open(
        hub: &Arc<RelayHub>,
        session: SessionIdentity,
    ) -> (Arc<Connection>, UnboundedReceiver<Outbound>) {
        let (transport, rx) = Transport::channel();
        (hub.open_session(session, transport), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            if let Outbound::Frame(frame) = outbound {
                messages.push(frame.message);
            }
        }
        messages
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.max_missed_probes, 0);
    }

    #[test]
    fn test_classify_device() {
        let params = ConnectParams {
            kind: Some("device".into()),
            device_id: Some("D1".into()),
            client_id: Some("C7".into()),
        };
        assert_eq!(
            params.classify(),
            SessionIdentity::device("D1", Some("C7".into()))
        );
    }

    #[test]
    fn test_classify_defaults_to_client() {
        let params = ConnectParams {
            kind: None,
            device_id: None,
            client_id: Some("C1".into()),
        };
        assert_eq!(params.classify(), SessionIdentity::client("C1"));

        // device without an id falls back to a client session
        let params = ConnectParams {
            kind: Some("device".into()),
            device_id: Some(String::new()),
            client_id: None,
        };
        let session = params.classify();
        assert_eq!(session.role, Role::Client);
        assert!(session.identity.starts_with("client_"));
    }

    #[test]
    fn test_generated_client_ids_differ() {
        assert_ne!(generate_client_id(), generate_client_id());
    }

    #[tokio::test]
    async fn test_welcome_lists_connected_devices() {
        let hub = hub();
        let (_d1, _drx) = open(&hub, SessionIdentity::device("D1", None));
        let (_c1, mut rx) = open(&hub, SessionIdentity::client("C1"));

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::Welcome {
                client_id: "C1".to_string(),
                devices: vec!["D1".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_device_connect_then_disconnect_broadcasts_in_order() {
        let hub = hub();
        let (_c1, mut rx1) = open(&hub, SessionIdentity::client("C1"));
        let (_c2, mut rx2) = open(&hub, SessionIdentity::client("C2"));
        drain(&mut rx1);
        drain(&mut rx2);

        let (device, _drx) = open(&hub, SessionIdentity::device("D1", None));
        hub.close_session(&device);

        let expected = vec![
            ServerMessage::DeviceConnected {
                device_id: "D1".to_string(),
            },
            ServerMessage::DeviceDisconnected {
                device_id: "D1".to_string(),
            },
        ];
        assert_eq!(drain(&mut rx1), expected);
        assert_eq!(drain(&mut rx2), expected);
        assert_eq!(hub.device_count(), 0);
    }

    #[tokio::test]
    async fn test_client_disconnect_is_not_announced() {
        let hub = hub();
        let (device, mut device_rx) = open(&hub, SessionIdentity::device("D1", None));
        let (_c1, mut rx1) = open(&hub, SessionIdentity::client("C1"));
        let (c2, _rx2) = open(&hub, SessionIdentity::client("C2"));
        drain(&mut rx1);

        hub.close_session(&c2);

        assert_eq!(hub.client_count(), 1);
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut device_rx).is_empty());
        assert!(device.is_open());
    }

    #[tokio::test]
    async fn test_close_session_is_idempotent() {
        let hub = hub();
        let (_c1, mut rx) = open(&hub, SessionIdentity::client("C1"));
        let (device, _drx) = open(&hub, SessionIdentity::device("D1", None));
        drain(&mut rx);

        hub.close_session(&device);
        hub.close_session(&device);

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::DeviceDisconnected {
                device_id: "D1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_without_disconnect_broadcast() {
        let hub = hub();
        let (_c1, mut rx) = open(&hub, SessionIdentity::client("C1"));
        let (old, mut old_rx) = open(&hub, SessionIdentity::device("D1", None));
        let (new, _new_rx) = open(&hub, SessionIdentity::device("D1", None));
        drain(&mut rx);

        assert!(!old.is_open());
        assert!(drain(&mut old_rx).is_empty());

        // the superseded session's close path must not evict its successor
        hub.close_session(&old);
        assert_eq!(hub.device_count(), 1);
        assert!(new.is_open());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_security_event_scenario() {
        let hub = hub();
        let (device, _drx) = open(&hub, SessionIdentity::device("D1", None));
        let (_client, mut rx) = open(&hub, SessionIdentity::client("C1"));

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::Welcome {
                client_id: "C1".to_string(),
                devices: vec!["D1".to_string()],
            }]
        );

        hub.handle_text(
            &device,
            r#"{"type":"security_event","event":"tamper","severity":"high"}"#,
        );

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::SecurityEvent {
                device_id: "D1".to_string(),
                event: Some(json!("tamper")),
                severity: Some(json!("high")),
            }]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_session_open() {
        let hub = hub();
        let (client, mut rx) = open(&hub, SessionIdentity::client("C1"));
        drain(&mut rx);

        hub.handle_text(&client, "{not json");
        hub.handle_text(&client, r#"{"type":"get_devices"}"#);

        assert!(client.is_open());
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::DevicesList { devices: vec![] }]
        );
    }

    #[tokio::test]
    async fn test_inbound_message_resets_probe_count() {
        let hub = hub();
        let (client, _rx) = open(&hub, SessionIdentity::client("C1"));
        client.record_probe();
        client.record_probe();

        hub.handle_text(&client, r#"{"type":"pong"}"#);
        assert_eq!(client.unacked_probes(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_refresh_liveness() {
        let hub = hub();
        let (client, _rx) = open(&hub, SessionIdentity::client("C1"));
        client.record_probe();

        hub.handle_text(&client, "{not json");
        assert_eq!(client.unacked_probes(), 1);
    }

    #[tokio::test]
    async fn test_send_to_non_string_device_id_gets_one_error() {
        let hub = hub();
        let (client, mut rx) = open(&hub, SessionIdentity::client("C1"));
        drain(&mut rx);

        hub.handle_text(
            &client,
            r#"{"type":"send_to_device","deviceId":123,"command":"x"}"#,
        );

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::device_not_connected(Some(json!(123)))]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_welcome_is_first_frame_under_device_churn() {
        let hub = hub();
        let stop = Arc::new(AtomicBool::new(false));

        let churn = {
            let hub = Arc::clone(&hub);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let mut round = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let (transport, _rx) = Transport::channel();
                    let device = hub.open_session(
                        SessionIdentity::device(format!("D{}", round % 4), None),
                        transport,
                    );
                    hub.close_session(&device);
                    round += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        for i in 0..2000 {
            let (_client, mut rx) = open(&hub, SessionIdentity::client(format!("C{}", i)));
            match rx.try_recv() {
                Ok(Outbound::Frame(frame)) => assert!(
                    matches!(frame.message, ServerMessage::Welcome { .. }),
                    "first frame was {:?}",
                    frame.message
                ),
                other => panic!("Expected welcome, got {:?}", other),
            }
            if i % 50 == 0 {
                tokio::task::yield_now().await;
            }
        }

        stop.store(true, Ordering::Relaxed);
        churn.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_devices_tracks_registry() {
        let hub = hub();
        let (client, mut rx) = open(&hub, SessionIdentity::client("C1"));
        let (d1, _r1) = open(&hub, SessionIdentity::device("D1", None));
        let (_d2, _r2) = open(&hub, SessionIdentity::device("D2", None));
        hub.close_session(&d1);
        let (_d3, _r3) = open(&hub, SessionIdentity::device("D3", None));
        drain(&mut rx);

        hub.handle_text(&client, r#"{"type":"get_devices"}"#);
        match drain(&mut rx).as_slice() {
            [ServerMessage::DevicesList { devices }] => {
                let mut devices = devices.clone();
                devices.sort();
                assert_eq!(devices, vec!["D2".to_string(), "D3".to_string()]);
            }
            other => panic!("Expected DevicesList, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything_quietly() {
        let hub = hub();
        let (client, mut rx) = open(&hub, SessionIdentity::client("C1"));
        let (device, _drx) = open(&hub, SessionIdentity::device("D1", None));
        drain(&mut rx);

        hub.shutdown();

        assert_eq!(hub.device_count(), 0);
        assert_eq!(hub.client_count(), 0);
        assert!(!client.is_open());
        assert!(!device.is_open());
        assert!(drain(&mut rx).is_empty());
    }
}
