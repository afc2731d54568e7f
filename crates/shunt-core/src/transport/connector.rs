//! Dialing side of the transport

use std::time::Duration;

use tokio::net::TcpStream;

use super::stream::Stream;
use crate::error::ConnectionError;
use crate::tls::TlsConnector;

/// Dials one fixed address, optionally wrapping the connection in TLS
#[derive(Clone)]
pub struct Connector {
    address: String,
    tls: Option<TlsConnector>,
    timeout: Duration,
}

impl Connector {
    /// Connector for plain TCP
    pub fn plain(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            tls: None,
            timeout,
        }
    }

    /// Connector that performs a TLS handshake after connecting
    pub fn tls(address: impl Into<String>, tls: TlsConnector, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            tls: Some(tls),
            timeout,
        }
    }

    /// Address this connector dials
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether connections are wrapped in TLS
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Open a new connection
    ///
    /// The timeout covers both the TCP connect and the TLS handshake.
    pub async fn connect(&self) -> Result<Stream, ConnectionError> {
        tokio::time::timeout(self.timeout, self.connect_inner())
            .await
            .map_err(|_| ConnectionError::Timeout(self.address.clone()))?
    }

    async fn connect_inner(&self) -> Result<Stream, ConnectionError> {
        let tcp = TcpStream::connect(&self.address)
            .await
            .map_err(|source| ConnectionError::Refused {
                addr: self.address.clone(),
                source,
            })?;

        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", self.address, e);
        }

        match &self.tls {
            Some(connector) => {
                let tls = connector
                    .connect(tcp)
                    .await
                    .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
                Ok(Stream::ClientTls(Box::new(tls)))
            }
            None => Ok(Stream::Tcp(tcp)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Listener;

    #[tokio::test]
    async fn test_plain_connect() {
        let listener = Listener::bind("127.0.0.1:0", None).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connector = Connector::plain(addr.to_string(), Duration::from_secs(5));
        let (client, incoming) = tokio::join!(connector.connect(), listener.accept());

        let client = client.unwrap();
        let server_side = incoming.unwrap().establish().await.unwrap();
        assert!(!client.is_encrypted());
        assert!(!server_side.is_encrypted());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = Listener::bind("127.0.0.1:0", None).await.unwrap();
            listener.local_addr().unwrap()
        };

        let connector = Connector::plain(addr.to_string(), Duration::from_secs(5));
        assert!(matches!(
            connector.connect().await,
            Err(ConnectionError::Refused { .. })
        ));
    }
}
