//! Live Connection
//!
//! A [`Connection`] wraps one realtime session: the non-blocking
//! [`Transport`] used to write frames to it, plus its role, identity and
//! liveness metadata.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::messages::{Frame, ServerMessage};

/// Unique identifier for one realtime session
///
/// Distinct from the identity: a device reconnecting under the same
/// identity gets a new session id.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Which side of the hub a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Device,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Device => "device",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Session accepted, not yet in the registry
    Connecting,
    /// Registered and routable
    Open,
    /// Removed from the registry or superseded
    Closed,
}

/// Instruction for the socket writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(Frame),
    Close,
}

/// Write half of a realtime session
///
/// Sends are handoffs onto an unbounded channel drained by the socket
/// writer, so they never block. A transport is open until it is closed
/// explicitly or the writer goes away.
#[derive(Debug)]
pub struct Transport {
    tx: mpsc::UnboundedSender<Outbound>,
    open: AtomicBool,
}

impl Transport {
    /// Create a transport and the receiver its writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                open: AtomicBool::new(true),
            },
            rx,
        )
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Best-effort send; returns whether the frame was handed off
    pub fn send(&self, frame: Frame) -> bool {
        if !self.is_open() {
            return false;
        }
        self.tx.send(Outbound::Frame(frame)).is_ok()
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

/// One live realtime session and its metadata
#[derive(Debug)]
pub struct Connection {
    session_id: SessionId,
    identity: String,
    role: Role,
    /// For devices, the client that initiated registration (informational)
    origin: Option<String>,
    transport: Transport,
    connected_at: DateTime<Utc>,
    /// Milliseconds since the epoch
    last_seen: AtomicI64,
    /// Probes sent since the last inbound traffic
    unacked_probes: AtomicU32,
    state: Mutex<ConnectionState>,
    probe: Mutex<Option<AbortHandle>>,
}

impl Connection {
    pub fn new(
        role: Role,
        identity: impl Into<String>,
        origin: Option<String>,
        transport: Transport,
    ) -> Arc<Self> {
        // last_seen is kept in millis; connected_at shares that precision
        let millis = Utc::now().timestamp_millis();
        let now = DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
        Arc::new(Self {
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            identity: identity.into(),
            role,
            origin,
            transport,
            connected_at: now,
            last_seen: AtomicI64::new(millis),
            unacked_probes: AtomicU32::new(0),
            state: Mutex::new(ConnectionState::Connecting),
            probe: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Stamp and send a message; failures are swallowed and reported as `false`
    pub fn send(&self, message: ServerMessage) -> bool {
        self.transport.send(message.stamp())
    }

    /// Send an already stamped frame (used for fan-out)
    pub fn send_frame(&self, frame: Frame) -> bool {
        self.transport.send(frame)
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        let millis = self.last_seen.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(self.connected_at)
    }

    /// Record inbound traffic from the peer
    pub fn touch(&self) {
        self.last_seen
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.unacked_probes.store(0, Ordering::Relaxed);
    }

    /// Record a successfully sent probe, returning the unacknowledged count
    pub fn record_probe(&self) -> u32 {
        self.last_seen
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.unacked_probes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn unacked_probes(&self) -> u32 {
        self.unacked_probes.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Attach the liveness probe task, cancelling any previous one
    pub fn attach_probe(&self, handle: AbortHandle) {
        if let Some(previous) = self.probe.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the liveness probe task, if any
    pub fn cancel_probe(&self) {
        if let Some(handle) = self.probe.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Device.to_string(), "device");
        assert_eq!(Role::Client.to_string(), "client");
    }

    #[test]
    fn test_send_reaches_writer() {
        let (transport, mut rx) = Transport::channel();
        let conn = Connection::new(Role::Client, "C1", None, transport);

        assert!(conn.send(ServerMessage::Ping));
        match rx.try_recv().unwrap() {
            Outbound::Frame(frame) => assert_eq!(frame.message, ServerMessage::Ping),
            Outbound::Close => panic!("Expected frame"),
        }
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_sends() {
        let (transport, mut rx) = Transport::channel();
        let conn = Connection::new(Role::Device, "D1", Some("C1".into()), transport);

        conn.close();
        conn.close();
        assert!(!conn.is_open());
        assert!(!conn.send(ServerMessage::Ping));

        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_writer_reports_closed() {
        let (transport, rx) = Transport::channel();
        let conn = Connection::new(Role::Client, "C1", None, transport);
        drop(rx);

        assert!(!conn.is_open());
        assert!(!conn.send(ServerMessage::Ping));
    }

    #[test]
    fn test_probe_accounting() {
        let (transport, _rx) = Transport::channel();
        let conn = Connection::new(Role::Client, "C1", None, transport);

        assert_eq!(conn.record_probe(), 1);
        assert_eq!(conn.record_probe(), 2);
        conn.touch();
        assert_eq!(conn.unacked_probes(), 0);
        assert!(conn.last_seen() >= conn.connected_at());
    }

    #[test]
    fn test_last_seen_never_precedes_connect() {
        for _ in 0..100 {
            let (transport, _rx) = Transport::channel();
            let conn = Connection::new(Role::Device, "D1", None, transport);
            assert_eq!(conn.connected_at().timestamp_subsec_nanos() % 1_000_000, 0);
            assert!(conn.last_seen() >= conn.connected_at());
        }
    }

    #[test]
    fn test_session_ids_are_unique() {
        let (t1, _rx1) = Transport::channel();
        let (t2, _rx2) = Transport::channel();
        let a = Connection::new(Role::Device, "X", None, t1);
        let b = Connection::new(Role::Device, "X", None, t2);
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.state(), ConnectionState::Connecting);
        assert_eq!(a.origin(), None);
    }
}
