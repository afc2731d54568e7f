//! Listening side of the transport

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use super::stream::Stream;
use crate::tls::{TlsAcceptor, TlsError};

/// A TCP listener that optionally terminates TLS
pub struct Listener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind to `addr`, serving TLS when an acceptor is given
    pub async fn bind(addr: &str, tls: Option<TlsAcceptor>) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Self { inner, tls })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Whether accepted connections are upgraded to TLS
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Accept the next TCP connection
    ///
    /// The TLS handshake is deferred to [`Incoming::establish`] so a slow
    /// peer cannot stall the accept loop.
    pub async fn accept(&self) -> io::Result<Incoming> {
        let (tcp, peer_addr) = self.inner.accept().await?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }
        Ok(Incoming {
            tcp,
            peer_addr,
            tls: self.tls.clone(),
        })
    }
}

/// An accepted connection that has not completed its TLS handshake yet
pub struct Incoming {
    tcp: TcpStream,
    peer_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
}

impl Incoming {
    /// Remote address of the connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Finish accepting: run the TLS handshake if the listener serves TLS
    pub async fn establish(self) -> Result<Stream, TlsError> {
        match self.tls {
            Some(acceptor) => {
                let tls = acceptor.accept(self.tcp).await?;
                Ok(Stream::ServerTls(Box::new(tls)))
            }
            None => Ok(Stream::Tcp(self.tcp)),
        }
    }

    /// Take the plain TCP stream, skipping any TLS upgrade
    pub fn into_tcp(self) -> TcpStream {
        self.tcp
    }
}
