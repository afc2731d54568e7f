//! Outbound control channel connector
//!
//! Dials the relay's communicate address, registers as its control channel
//! and keeps retrying with backoff until it succeeds or is cancelled.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use shunt_core::config::AgentConfig;
use shunt_core::tls::TlsConnector;
use shunt_core::{Connector, ShuntError, Stream};
use shunt_protocol::{FrameCodec, Handshake, Message, ProtocolError, SessionId};

use super::reconnect::ExponentialBackoff;

/// Events received from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// A public client is waiting for a data channel
    NewSession { session_id: SessionId },
    /// Heartbeat request
    Heartbeat { timestamp: u64 },
    /// Control channel lost
    Disconnected { reason: String },
}

/// Establishes the outbound control channel to the relay
pub struct TunnelConnector {
    /// Agent configuration
    config: AgentConfig,
    /// Dialer for the communicate address, plain or TLS
    connector: Connector,
}

impl TunnelConnector {
    /// Create a new tunnel connector
    ///
    /// Loads the trusted relay certificate when TLS is enabled.
    pub fn new(config: AgentConfig) -> Result<Self, ShuntError> {
        config.validate()?;
        let connector = communicate_connector(&config)?;
        Ok(Self { config, connector })
    }

    /// Get the agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Dialer for the relay's communicate address
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Connect to the relay, retrying until success
    ///
    /// Returns `None` only when `cancel` fires first.
    pub async fn connect_with_retry(
        &self,
        backoff: &mut ExponentialBackoff,
        cancel: &CancellationToken,
    ) -> Option<ControlChannel> {
        loop {
            tracing::debug!("Connecting to relay at {}", self.connector.address());

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                attempt = self.try_connect() => attempt,
            };

            match attempt {
                Ok(channel) => {
                    tracing::info!(
                        "Registered with relay at {} (tls: {})",
                        self.connector.address(),
                        self.connector.is_tls()
                    );
                    return Some(channel);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("Connection failed: {}. Retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Attempt a single connection and registration
    async fn try_connect(&self) -> Result<ControlChannel, ShuntError> {
        let mut stream = self.connector.connect().await?;
        Handshake::Control.write_to(&mut stream).await?;
        Ok(ControlChannel::new(stream))
    }
}

/// Build the dialer for the communicate address from the agent configuration
pub fn communicate_connector(config: &AgentConfig) -> Result<Connector, ShuntError> {
    let address = config.communicate_address()?.socket_address();

    if !config.tls_enabled() {
        return Ok(Connector::plain(address, config.connect_timeout));
    }

    let server_name = config.tls_server_name()?;
    let tls = match &config.ssl_cert {
        Some(ca_path) => TlsConnector::with_trusted_certificate(ca_path, &server_name)?,
        None => {
            tracing::warn!(
                "No ssl-cert configured; the relay certificate will not be verified"
            );
            TlsConnector::new_insecure(&server_name)?
        }
    };

    Ok(Connector::tls(address, tls, config.connect_timeout))
}

/// A registered control channel
pub struct ControlChannel {
    framed: Framed<Stream, FrameCodec>,
}

impl ControlChannel {
    fn new(stream: Stream) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    /// Wait for the next event from the relay
    ///
    /// A channel that stays silent for `timeout` is reported as lost.
    pub async fn recv_event(&mut self, timeout: Duration) -> TunnelEvent {
        let next = match tokio::time::timeout(timeout, self.framed.next()).await {
            Ok(next) => next,
            Err(_) => {
                return TunnelEvent::Disconnected {
                    reason: format!("no frame within {:?}", timeout),
                }
            }
        };

        match next {
            Some(Ok(Message::NewSession { session_id })) => TunnelEvent::NewSession { session_id },
            Some(Ok(Message::Heartbeat { timestamp })) => TunnelEvent::Heartbeat { timestamp },
            Some(Ok(Message::HeartbeatAck { .. })) => TunnelEvent::Disconnected {
                reason: "unexpected heartbeat ack from relay".to_string(),
            },
            Some(Err(e)) => TunnelEvent::Disconnected {
                reason: e.to_string(),
            },
            None => TunnelEvent::Disconnected {
                reason: "connection closed by relay".to_string(),
            },
        }
    }

    /// Send heartbeat acknowledgment
    pub async fn send_heartbeat_ack(&mut self, timestamp: u64) -> Result<(), ProtocolError> {
        self.framed.send(Message::HeartbeatAck { timestamp }).await
    }
}
