//! Liveness Monitor
//!
//! Arms one recurring probe per connection. Each tick sends a `ping` frame
//! while the transport is open; once the transport reports closed, the
//! connection is reaped through the hub. Probes keep intermediaries from
//! idling the session out; eviction of unresponsive peers is opt-in via
//! `max_missed_probes`.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::connection::Connection;
use super::hub::RelayHub;
use super::messages::ServerMessage;

/// Result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Ping handed to the transport
    Sent,
    /// Transport is no longer open
    Closed,
    /// Too many probes went unanswered
    Unresponsive,
}

/// Schedules liveness probes
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    interval: Duration,
    /// 0 disables eviction
    max_missed_probes: u32,
}

impl LivenessMonitor {
    pub fn new(interval: Duration, max_missed_probes: u32) -> Self {
        Self {
            interval,
            max_missed_probes,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe a connection once
    pub fn probe(&self, connection: &Connection) -> Probe {
        if !connection.is_open() {
            return Probe::Closed;
        }
        if self.max_missed_probes > 0 && connection.unacked_probes() >= self.max_missed_probes {
            return Probe::Unresponsive;
        }
        if connection.send(ServerMessage::Ping) {
            connection.record_probe();
            Probe::Sent
        } else {
            Probe::Closed
        }
    }

    /// Arm the recurring probe for `connection`
    ///
    /// The task handle is stored on the connection so that removal cancels it.
    pub fn watch(&self, hub: Arc<RelayHub>, connection: Arc<Connection>) {
        let monitor = self.clone();
        let target = Arc::clone(&connection);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + monitor.interval, monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match monitor.probe(&target) {
                    Probe::Sent => {
                        tracing::trace!(
                            role = %target.role(),
                            identity = %target.identity(),
                            "Liveness probe sent"
                        );
                    }
                    Probe::Closed => {
                        tracing::debug!(
                            role = %target.role(),
                            identity = %target.identity(),
                            "Transport closed, reaping connection"
                        );
                        hub.close_session(&target);
                        break;
                    }
                    Probe::Unresponsive => {
                        tracing::warn!(
                            role = %target.role(),
                            identity = %target.identity(),
                            missed = target.unacked_probes(),
                            "Connection unresponsive, evicting"
                        );
                        hub.close_session(&target);
                        break;
                    }
                }
            }
        });

        connection.attach_probe(task.abort_handle());
    }
}
