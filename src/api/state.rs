//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::control::ControlPlane;
use crate::websocket::{HubConfig, RelayHub};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay hub owning every realtime session
    pub hub: Arc<RelayHub>,
    /// Control-plane operations over the hub
    pub control: Arc<ControlPlane>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with a fresh hub
    pub fn new(config: ServerConfig, hub_config: HubConfig) -> Self {
        let hub = Arc::new(RelayHub::new(hub_config));
        let control = Arc::new(ControlPlane::new(Arc::clone(&hub), config.ws_url()));

        Self {
            hub,
            control,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
