//! Bidirectional byte relay
//!
//! Joins two connections and copies bytes both ways until each direction
//! reaches end-of-stream. End-of-stream on one side half-closes the other
//! side's write half, so a peer that stops sending can still receive. An
//! I/O error in either direction tears down the whole pair.

use std::io;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

const BUFFER_SIZE: usize = 16 * 1024;

/// Tunables for a relay pair
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayOptions {
    /// Abort a direction when no bytes arrive for this long
    pub idle_timeout: Option<Duration>,
}

/// Byte counts for a finished relay pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the first stream to the second
    pub a_to_b: u64,
    /// Bytes copied from the second stream to the first
    pub b_to_a: u64,
}

impl RelayStats {
    pub fn total(&self) -> u64 {
        self.a_to_b + self.b_to_a
    }
}

/// Relay bytes between `a` and `b` with default options
pub async fn run<A, B>(a: A, b: B) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    run_with(a, b, RelayOptions::default()).await
}

/// Relay bytes between `a` and `b`
///
/// Returns once both directions have finished. Both streams are dropped,
/// and therefore closed, before this returns.
pub async fn run_with<A, B>(a: A, b: B, options: RelayOptions) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    run_until(a, b, options, CancellationToken::new()).await
}

/// Relay bytes between `a` and `b` until both directions finish or
/// `shutdown` fires
///
/// Cancelling `shutdown` closes both streams without waiting for
/// end-of-stream. Failures inside the pair never cancel `shutdown` itself.
pub async fn run_until<A, B>(
    a: A,
    b: B,
    options: RelayOptions,
    shutdown: CancellationToken,
) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (a_read, a_write) = split(a);
    let (b_read, b_write) = split(b);
    let cancel = shutdown.child_token();

    let a_to_b = tokio::spawn(copy_direction(
        a_read,
        b_write,
        "a->b",
        options.idle_timeout,
        cancel.clone(),
    ));
    let b_to_a = tokio::spawn(copy_direction(
        b_read,
        a_write,
        "b->a",
        options.idle_timeout,
        cancel.clone(),
    ));

    let (a_to_b, b_to_a) = tokio::join!(a_to_b, b_to_a);

    let stats = RelayStats {
        a_to_b: a_to_b.unwrap_or_else(|e| {
            tracing::warn!("Relay task a->b panicked: {}", e);
            0
        }),
        b_to_a: b_to_a.unwrap_or_else(|e| {
            tracing::warn!("Relay task b->a panicked: {}", e);
            0
        }),
    };

    tracing::debug!(
        "Relay pair closed ({} bytes a->b, {} bytes b->a)",
        stats.a_to_b,
        stats.b_to_a
    );
    stats
}

/// Copy one direction, returning the number of bytes written
///
/// Errors are logged here and cancel the paired direction; the byte count
/// up to the failure is still reported.
async fn copy_direction<R, W>(
    mut reader: R,
    mut writer: W,
    direction: &'static str,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::trace!("{}: cancelled after {} bytes", direction, total);
                return total;
            }
            result = read_with_timeout(&mut reader, &mut buf, idle_timeout) => result,
        };

        let n = match read {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("{}: read failed after {} bytes: {}", direction, total, e);
                cancel.cancel();
                return total;
            }
        };

        if n == 0 {
            tracing::trace!("{}: end of stream after {} bytes", direction, total);
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("{}: half-close failed: {}", direction, e);
            }
            return total;
        }

        let write = async {
            writer.write_all(&buf[..n]).await?;
            writer.flush().await
        };
        let written = tokio::select! {
            _ = cancel.cancelled() => return total,
            result = write => result,
        };
        if let Err(e) = written {
            tracing::debug!("{}: write failed after {} bytes: {}", direction, total, e);
            cancel.cancel();
            return total;
        }

        total += n as u64;
    }
}

async fn read_with_timeout<R>(
    reader: &mut R,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        None => reader.read(buf).await,
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no traffic for {:?}", limit),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_round_trip_both_directions() {
        let (mut client, relay_a) = duplex(1024);
        let (relay_b, mut server) = duplex(1024);

        let handle = tokio::spawn(run(relay_a, relay_b));

        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        server.write_all(b"PONG").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG");

        client.shutdown().await.unwrap();
        server.shutdown().await.unwrap();

        let stats = handle.await.unwrap();
        assert_eq!(stats, RelayStats { a_to_b: 4, b_to_a: 4 });
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let (mut client, relay_a) = duplex(64);
        let (relay_b, mut server) = duplex(64);

        let handle = tokio::spawn(run(relay_a, relay_b));

        client.shutdown().await.unwrap();
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());

        server.shutdown().await.unwrap();
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());

        assert_eq!(handle.await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_binary_payload_is_byte_exact() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let (mut client, relay_a) = duplex(4096);
        let (relay_b, mut server) = duplex(4096);
        let handle = tokio::spawn(run(relay_a, relay_b));

        let expected = payload.clone();
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            server.read_to_end(&mut received).await.unwrap();
            server.shutdown().await.unwrap();
            received
        });

        client.write_all(&payload).await.unwrap();
        client.shutdown().await.unwrap();

        let received = reader.await.unwrap();
        assert_eq!(received, expected);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.a_to_b, payload.len() as u64);
        assert_eq!(stats.b_to_a, 0);
    }

    #[tokio::test]
    async fn test_half_close_keeps_reverse_direction_open() {
        let (mut client, relay_a) = duplex(1024);
        let (relay_b, mut server) = duplex(1024);
        let handle = tokio::spawn(run(relay_a, relay_b));

        // Client finishes sending
        client.write_all(b"request").await.unwrap();
        client.shutdown().await.unwrap();

        let mut request = Vec::new();
        server.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"request");

        // Server can still answer after seeing end of stream
        server.write_all(b"response").await.unwrap();
        server.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"response");

        let stats = handle.await.unwrap();
        assert_eq!(stats, RelayStats { a_to_b: 7, b_to_a: 8 });
    }

    #[tokio::test]
    async fn test_closed_peer_ends_pair() {
        let (client, relay_a) = duplex(64);
        let (relay_b, mut server) = duplex(64);
        let handle = tokio::spawn(run(relay_a, relay_b));

        drop(client);
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        drop(server);

        let stats = handle.await.unwrap();
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_active_pair() {
        let (mut client, relay_a) = duplex(64);
        let (relay_b, mut server) = duplex(64);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_until(
            relay_a,
            relay_b,
            RelayOptions::default(),
            shutdown.clone(),
        ));

        client.write_all(b"live").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();

        // Neither side has closed; only the shutdown token ends the pair
        shutdown.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.a_to_b, 4);

        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);
        assert_eq!(server.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pair_failure_leaves_shutdown_token_alone() {
        let (mut client, relay_a) = duplex(64);
        let (relay_b, server) = duplex(64);
        let shutdown = CancellationToken::new();

        // Writing towards a vanished server fails inside the pair
        drop(server);
        client.write_all(b"lost").await.unwrap();
        run_until(relay_a, relay_b, RelayOptions::default(), shutdown.clone()).await;

        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_closes_pair() {
        let (mut client, relay_a) = duplex(64);
        let (relay_b, mut server) = duplex(64);

        let options = RelayOptions {
            idle_timeout: Some(Duration::from_secs(5)),
        };
        let handle = tokio::spawn(run_with(relay_a, relay_b, options));

        // Nobody sends anything; the timeout tears the pair down
        let stats = handle.await.unwrap();
        assert_eq!(stats.total(), 0);

        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
