//! shunt-agent: Private side of a shunt tunnel
//!
//! The agent runs next to the target service and only makes outbound
//! connections. It keeps a control channel registered with the relay and,
//! for each session the relay announces, opens a data channel and bridges
//! it to the target.

pub mod state;
pub mod tunnel;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use shunt_core::config::AgentConfig;
use shunt_core::relay::RelayOptions;
use shunt_core::{Connector, ShuntError};

pub use state::{AgentState, ConnectionState};
use tunnel::{ControlChannel, ExponentialBackoff, Provisioner, TunnelConnector, TunnelEvent};

/// The tunnel agent
pub struct Agent {
    /// Control channel dialer
    connector: TunnelConnector,
    /// Data channel provisioning
    provisioner: Provisioner,
    /// Observable connection state
    state: Arc<AgentState>,
}

impl Agent {
    /// Create an agent from its configuration
    pub fn new(config: AgentConfig) -> Result<Self, ShuntError> {
        let target = Connector::plain(config.target.clone(), config.connect_timeout);
        let options = RelayOptions {
            idle_timeout: config.idle_timeout,
        };
        let connector = TunnelConnector::new(config)?;
        let provisioner = Provisioner::new(connector.connector().clone(), target, options);

        Ok(Self {
            connector,
            provisioner,
            state: Arc::new(AgentState::new()),
        })
    }

    /// Get the agent configuration
    pub fn config(&self) -> &AgentConfig {
        self.connector.config()
    }

    /// Get the shared connection state
    pub fn state(&self) -> &Arc<AgentState> {
        &self.state
    }

    /// Keep a control channel registered until `cancel` fires
    ///
    /// Reconnects with backoff whenever the control channel is lost. The
    /// backoff restarts from its initial delay after every successful
    /// registration. Sessions already being relayed are left to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = ExponentialBackoff::from_config(&self.config().backoff);

        loop {
            self.state.set(ConnectionState::Connecting);
            let Some(mut control) = self
                .connector
                .connect_with_retry(&mut backoff, &cancel)
                .await
            else {
                break;
            };

            backoff.reset();
            self.state.set(ConnectionState::Registered);

            let reason = self.serve(&mut control, &cancel).await;
            self.state.set(ConnectionState::Disconnected);

            if cancel.is_cancelled() {
                break;
            }
            tracing::warn!("Disconnected from relay: {}", reason);
        }

        self.state.set(ConnectionState::Disconnected);
        tracing::info!("Agent stopped");
    }

    /// Read control events until the channel is lost
    async fn serve(&self, control: &mut ControlChannel, cancel: &CancellationToken) -> String {
        let heartbeat_timeout = self.config().heartbeat_timeout;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return "shutting down".to_string(),
                event = control.recv_event(heartbeat_timeout) => event,
            };

            match event {
                TunnelEvent::NewSession { session_id } => {
                    tracing::info!("Provisioning session {}", session_id);
                    tokio::spawn(self.provisioner.clone().run_logged(session_id));
                }

                TunnelEvent::Heartbeat { timestamp } => {
                    tracing::trace!("Heartbeat received, sending ack");
                    if let Err(e) = control.send_heartbeat_ack(timestamp).await {
                        return format!("failed to send heartbeat ack: {}", e);
                    }
                }

                TunnelEvent::Disconnected { reason } => return reason,
            }
        }
    }
}
