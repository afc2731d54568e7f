//! Unified stream type for plain and TLS connections

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;

/// A connection that is either plain TCP or TLS-encrypted
///
/// The TLS variants are boxed to keep the enum small.
pub enum Stream {
    /// Plain TCP connection
    Tcp(TcpStream),
    /// TLS connection accepted by the relay
    ServerTls(Box<ServerTlsStream<TcpStream>>),
    /// TLS connection dialed by the agent
    ClientTls(Box<ClientTlsStream<TcpStream>>),
}

impl Stream {
    /// Check if this stream is TLS-encrypted
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Stream::Tcp(_))
    }

    /// Underlying TCP stream
    pub fn tcp_ref(&self) -> &TcpStream {
        match self {
            Stream::Tcp(stream) => stream,
            Stream::ServerTls(tls) => tls.get_ref().0,
            Stream::ClientTls(tls) => tls.get_ref().0,
        }
    }

    /// Remote address of the underlying socket
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_ref().peer_addr()
    }
}

impl From<TcpStream> for Stream {
    fn from(stream: TcpStream) -> Self {
        Stream::Tcp(stream)
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Stream::ServerTls(stream) => Pin::new(stream).poll_read(cx, buf),
            Stream::ClientTls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Stream::ServerTls(stream) => Pin::new(stream).poll_write(cx, buf),
            Stream::ClientTls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Stream::ServerTls(stream) => Pin::new(stream).poll_flush(cx),
            Stream::ClientTls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Stream::ServerTls(stream) => Pin::new(stream).poll_shutdown(cx),
            Stream::ClientTls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
