//! Connection Registry
//!
//! Two identity-keyed collections, one per [`Role`]. Each collection sits
//! behind its own lock; an identity appears at most once per collection
//! and device/client namespaces are independent.
//!
//! Lock order is devices before clients. The `*_with` variants run a
//! callback while the touched collection is still write-locked, which is
//! how the hub makes a device insert/remove and its broadcast atomic; such
//! callbacks may read the client collection but must not touch the one
//! being mutated.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::connection::{Connection, ConnectionState, Role};

/// Live connections keyed by role and identity
#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<HashMap<String, Arc<Connection>>>,
    clients: RwLock<HashMap<String, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, role: Role) -> &RwLock<HashMap<String, Arc<Connection>>> {
        match role {
            Role::Device => &self.devices,
            Role::Client => &self.clients,
        }
    }

    /// Insert a connection under its role and identity
    ///
    /// A prior entry with the same key is replaced; its transport is closed
    /// and its probe cancelled.
    pub fn register(&self, connection: Arc<Connection>) -> Arc<Connection> {
        self.register_with(connection, Arc::clone)
    }

    /// Insert a connection, then run `then` before releasing the lock
    pub fn register_with<R>(
        &self,
        connection: Arc<Connection>,
        then: impl FnOnce(&Arc<Connection>) -> R,
    ) -> R {
        let mut entries = self.collection(connection.role()).write();
        Self::insert(&mut entries, &connection);
        then(&connection)
    }

    /// Insert a client while the device collection is read-locked, then run
    /// `then` with the current device identities before releasing either lock
    ///
    /// Device connect/disconnect broadcasts need the device write lock, so
    /// none of them can reach the client ahead of what `then` sends.
    pub fn register_client_with<R>(
        &self,
        connection: Arc<Connection>,
        then: impl FnOnce(&Arc<Connection>, Vec<String>) -> R,
    ) -> R {
        debug_assert_eq!(connection.role(), Role::Client);
        let devices = self.devices.read();
        let mut clients = self.clients.write();
        Self::insert(&mut clients, &connection);
        then(&connection, devices.keys().cloned().collect())
    }

    fn insert(entries: &mut HashMap<String, Arc<Connection>>, connection: &Arc<Connection>) {
        connection.set_state(ConnectionState::Open);

        if let Some(previous) =
            entries.insert(connection.identity().to_string(), Arc::clone(connection))
        {
            if previous.session_id() != connection.session_id() {
                tracing::warn!(
                    role = %connection.role(),
                    identity = %connection.identity(),
                    superseded_session = previous.session_id(),
                    session_id = connection.session_id(),
                    "Identity reconnected, closing superseded session"
                );
                previous.cancel_probe();
                previous.set_state(ConnectionState::Closed);
                previous.close();
            }
        }
    }

    pub fn lookup(&self, role: Role, identity: &str) -> Option<Arc<Connection>> {
        self.collection(role).read().get(identity).cloned()
    }

    /// Remove the entry for `(role, identity)` unconditionally
    pub fn remove(&self, role: Role, identity: &str) -> Option<Arc<Connection>> {
        self.collection(role).write().remove(identity)
    }

    /// Remove `connection` only if it is still the current entry for its key,
    /// then run `then` before releasing the lock
    ///
    /// Returns `None` when the connection was already gone or superseded.
    pub fn remove_session_with<R>(
        &self,
        connection: &Connection,
        then: impl FnOnce(&Arc<Connection>) -> R,
    ) -> Option<R> {
        let mut entries = self.collection(connection.role()).write();
        let current = entries
            .get(connection.identity())
            .is_some_and(|entry| entry.session_id() == connection.session_id());
        if !current {
            return None;
        }

        let removed = entries.remove(connection.identity())?;
        removed.set_state(ConnectionState::Closed);
        Some(then(&removed))
    }

    /// Snapshot of identities in one collection; order is unspecified
    pub fn list_identities(&self, role: Role) -> Vec<String> {
        self.collection(role).read().keys().cloned().collect()
    }

    /// Snapshot of connections in one collection; order is unspecified
    pub fn snapshot(&self, role: Role) -> Vec<Arc<Connection>> {
        self.collection(role).read().values().cloned().collect()
    }

    pub fn len(&self, role: Role) -> usize {
        self.collection(role).read().len()
    }

    pub fn is_empty(&self, role: Role) -> bool {
        self.collection(role).read().is_empty()
    }
}
