//! WebSocket Relay
//!
//! Realtime sessions for devices and clients, and the hub that routes
//! events between them.
//!
//! ## Architecture
//!
//! - **Registry**: live connections keyed by role and identity
//! - **Router**: dispatches inbound messages by `type`
//! - **Monitor**: periodic liveness probes, reaps dead connections
//! - **Hub**: session lifecycle tying the three together
//! - **Handler**: WebSocket upgrade and socket I/O
//!
//! ## Usage
//!
//! Devices connect to `/ws?type=device&deviceId=ID` and publish events
//! (`credential_added`, `security_event`, ...) that are broadcast to every
//! client. Clients connect to `/ws?type=client&clientId=ID` and may list
//! devices or send them commands.
//!
//! ```javascript
//! // Browser dashboard
//! const ws = new WebSocket('ws://localhost:8080/ws?type=client&clientId=dash');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'welcome') {
//!     ws.send(JSON.stringify({type: 'send_to_device', deviceId: msg.devices[0], command: 'status'}));
//!   }
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
mod monitor;
mod registry;
mod router;

pub use connection::{Connection, ConnectionState, Outbound, Role, SessionId, Transport};
pub use handler::websocket_handler;
pub use hub::{generate_client_id, ConnectParams, HubConfig, RelayHub, SessionIdentity};
pub use messages::{iso_timestamp, ClientMessage, DeviceMessage, Frame, ServerMessage};
pub(crate) use messages::present;
pub use monitor::{LivenessMonitor, Probe};
pub use registry::Registry;
pub use router::{Delivery, MessageRouter};
