//! # Relay Hub
//!
//! Realtime relay between device agents and observer clients. Devices and
//! clients hold WebSocket sessions against the hub; device events are
//! broadcast to every client, clients can query devices and send them
//! commands, and a REST control plane covers registration, discovery,
//! notification and broadcast.
//!
//! ## Modules
//!
//! - [`websocket`]: Connection registry, message router, liveness monitor
//! - [`control`]: Control-plane operations over the hub
//! - [`api`]: REST API and WebSocket endpoint with Axum
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay_hub::{serve, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let state = AppState::new(config.server.clone(), config.hub.hub_config());
//!
//!     // Runs until Ctrl+C, then closes every session
//!     serve(state, &config.server).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod control;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, HubSettings, LoggingConfig, ServerConfig};

pub use control::{BridgeError, ControlPlane, DeviceDescriptor, DeviceSummary, Registration};

pub use websocket::{
    websocket_handler, ClientMessage, Connection, Delivery, DeviceMessage, HubConfig,
    MessageRouter, RelayHub, Registry, Role, ServerMessage,
};
