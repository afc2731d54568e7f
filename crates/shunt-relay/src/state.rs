//! Shared relay state

use std::sync::Arc;

use tokio::net::TcpStream;

use shunt_core::config::RelayConfig;
use shunt_core::RelayOptions;

use crate::connection::{ControlSlot, HealthMonitor};
use crate::session::SessionRegistry;

/// State shared by every connection handler of one relay
pub struct RelayState {
    /// Configuration
    pub config: RelayConfig,
    /// Public connections waiting for a data channel
    pub sessions: Arc<SessionRegistry<TcpStream>>,
    /// The agent's control channel
    pub control: ControlSlot,
}

impl RelayState {
    /// Create new relay state
    pub fn new(config: RelayConfig) -> Self {
        let sessions = SessionRegistry::new(config.provisioning_timeout)
            .with_max_pending(config.max_pending_sessions);

        Self {
            config,
            sessions: Arc::new(sessions),
            control: ControlSlot::new(),
        }
    }

    /// Get the session registry
    pub fn session_registry(&self) -> &Arc<SessionRegistry<TcpStream>> {
        &self.sessions
    }

    /// Heartbeat settings for control channels
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.config.heartbeat_interval, self.config.heartbeat_timeout)
    }

    /// Options for relay pairs
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            idle_timeout: self.config.idle_timeout,
        }
    }
}
