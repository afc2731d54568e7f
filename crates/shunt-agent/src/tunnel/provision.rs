//! Data channel provisioning
//!
//! For every `NewSession` request the agent opens a fresh data channel to
//! the relay, dials the local target service and relays between the two.
//! Failures abandon the attempt; the relay's provisioning timeout closes the
//! waiting client.

use shunt_core::relay::{self, RelayOptions, RelayStats};
use shunt_core::{Connector, ShuntError};
use shunt_protocol::{Handshake, SessionId};

/// Opens data channels and bridges them to the target service
#[derive(Clone)]
pub struct Provisioner {
    /// Dialer for the relay's communicate address
    relay: Connector,
    /// Dialer for the local target service
    target: Connector,
    /// Options for the agent-side relay pair
    options: RelayOptions,
}

impl Provisioner {
    pub fn new(relay: Connector, target: Connector, options: RelayOptions) -> Self {
        Self {
            relay,
            target,
            options,
        }
    }

    /// Provision one session and relay it until both sides close
    pub async fn run(&self, session_id: SessionId) -> Result<RelayStats, ShuntError> {
        let mut data = self.relay.connect().await?;
        Handshake::Data(session_id).write_to(&mut data).await?;
        tracing::debug!("Data channel open for session {}", session_id);

        let target = self.target.connect().await?;
        tracing::debug!(
            "Connected session {} to target {}",
            session_id,
            self.target.address()
        );

        Ok(relay::run_with(data, target, self.options).await)
    }

    /// Provision a session, logging the outcome instead of returning it
    pub async fn run_logged(self, session_id: SessionId) {
        match self.run(session_id).await {
            Ok(stats) => {
                tracing::info!(
                    "Session {} closed ({} bytes relay->target, {} bytes target->relay)",
                    session_id,
                    stats.a_to_b,
                    stats.b_to_a
                );
            }
            Err(e) => {
                tracing::warn!("Provisioning for session {} failed: {}", session_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use shunt_core::Listener;

    #[tokio::test]
    async fn test_provision_bridges_data_channel_to_target() {
        let relay_listener = Listener::bind("127.0.0.1:0", None).await.unwrap();
        let target_listener = Listener::bind("127.0.0.1:0", None).await.unwrap();
        let timeout = Duration::from_secs(2);

        let provisioner = Provisioner::new(
            Connector::plain(relay_listener.local_addr().unwrap().to_string(), timeout),
            Connector::plain(target_listener.local_addr().unwrap().to_string(), timeout),
            RelayOptions::default(),
        );

        let session_id = SessionId::from_parts(9, 9);
        let task = tokio::spawn(provisioner.clone().run_logged(session_id));

        let mut data = relay_listener.accept().await.unwrap().establish().await.unwrap();
        assert_eq!(
            Handshake::read_from(&mut data).await.unwrap(),
            Handshake::Data(session_id)
        );

        let mut target = target_listener.accept().await.unwrap().into_tcp();
        data.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        drop(data);
        drop(target);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_target_fails() {
        let relay_listener = Listener::bind("127.0.0.1:0", None).await.unwrap();
        let dead_target = {
            let listener = Listener::bind("127.0.0.1:0", None).await.unwrap();
            listener.local_addr().unwrap()
        };
        let timeout = Duration::from_secs(2);

        let provisioner = Provisioner::new(
            Connector::plain(relay_listener.local_addr().unwrap().to_string(), timeout),
            Connector::plain(dead_target.to_string(), timeout),
            RelayOptions::default(),
        );

        let accept = tokio::spawn(async move {
            let mut data = relay_listener.accept().await.unwrap().establish().await.unwrap();
            Handshake::read_from(&mut data).await.unwrap();
            let mut rest = Vec::new();
            data.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let result = provisioner.run(SessionId::from_parts(1, 1)).await;
        assert!(matches!(result, Err(ShuntError::Connection(_))));
        // The abandoned data channel is closed without payload
        assert!(accept.await.unwrap().is_empty());
    }
}
