//! Agent control channel registration
//!
//! The relay serves exactly one agent. Its control channel is kept in a
//! [`ControlSlot`]; registering a new control channel supersedes and cancels
//! the previous one. Every registration gets a generation number so a
//! handler tearing down an old channel cannot evict its replacement.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shunt_core::error::ConnectionError;
use shunt_protocol::{Message, SessionId};

/// Capacity of the per-agent command queue
pub const COMMAND_QUEUE_SIZE: usize = 256;

/// A message queued for the control channel writer
#[derive(Debug)]
pub struct ControlCommand {
    /// Message to write
    pub message: Message,
    /// Notified with the outcome of the write
    pub reply: oneshot::Sender<Result<(), String>>,
}

/// The active agent control channel
pub struct ControlHandle {
    /// Registration generation
    pub generation: u64,
    /// Remote address of the agent
    pub peer_addr: SocketAddr,
    /// When the channel was registered
    pub registered_at: Instant,
    command_tx: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
}

impl ControlHandle {
    /// Ask the agent to open a data channel for `session_id`
    ///
    /// Resolves once the request has been written to the control channel.
    pub async fn send_new_session(&self, session_id: SessionId) -> Result<(), ConnectionError> {
        let (reply, written) = oneshot::channel();
        let command = ControlCommand {
            message: Message::NewSession { session_id },
            reply,
        };

        self.command_tx
            .send(command)
            .await
            .map_err(|_| ConnectionError::Lost("control channel closed".to_string()))?;

        match written.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ConnectionError::Lost(reason)),
            Err(_) => Err(ConnectionError::Lost("control channel closed".to_string())),
        }
    }

    /// Disconnect this control channel
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Slot holding at most one active control registration
pub struct ControlSlot {
    current: RwLock<Option<Arc<ControlHandle>>>,
    next_generation: AtomicU64,
}

impl ControlSlot {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Install a control channel, superseding any existing one
    pub async fn install(
        &self,
        peer_addr: SocketAddr,
        command_tx: mpsc::Sender<ControlCommand>,
        cancel: CancellationToken,
    ) -> Arc<ControlHandle> {
        let handle = Arc::new(ControlHandle {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            registered_at: Instant::now(),
            command_tx,
            cancel,
        });

        let previous = self.current.write().await.replace(Arc::clone(&handle));
        if let Some(previous) = previous {
            tracing::info!(
                "Control channel from {} (generation {}) superseded by {}",
                previous.peer_addr,
                previous.generation,
                peer_addr
            );
            previous.cancel();
        }

        tracing::info!(
            "Control channel registered from {} (generation {})",
            peer_addr,
            handle.generation
        );
        handle
    }

    /// Current registration, if any
    pub async fn current(&self) -> Option<Arc<ControlHandle>> {
        self.current.read().await.clone()
    }

    /// Remove the registration if it is still `generation`
    ///
    /// Returns whether it was removed.
    pub async fn remove_if_current(&self, generation: u64) -> bool {
        let mut current = self.current.write().await;
        match current.as_ref() {
            Some(handle) if handle.generation == generation => {
                handle.cancel();
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// Drop whatever registration is installed
    pub async fn clear(&self) {
        if let Some(handle) = self.current.write().await.take() {
            handle.cancel();
        }
    }

    pub async fn is_registered(&self) -> bool {
        self.current.read().await.is_some()
    }
}

impl Default for ControlSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_install_supersedes_previous() {
        let slot = ControlSlot::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        let first = slot.install(addr(1), tx1, CancellationToken::new()).await;
        let second = slot.install(addr(2), tx2, CancellationToken::new()).await;

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(second.generation > first.generation);
        assert_eq!(slot.current().await.unwrap().generation, second.generation);
    }

    #[tokio::test]
    async fn test_stale_generation_does_not_evict() {
        let slot = ControlSlot::new();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        let first = slot.install(addr(1), tx1, CancellationToken::new()).await;
        let second = slot.install(addr(2), tx2, CancellationToken::new()).await;

        assert!(!slot.remove_if_current(first.generation).await);
        assert!(slot.is_registered().await);
        assert!(slot.remove_if_current(second.generation).await);
        assert!(!slot.is_registered().await);
    }

    #[tokio::test]
    async fn test_send_new_session_waits_for_write() {
        let slot = ControlSlot::new();
        let (tx, mut rx) = mpsc::channel(1);
        let handle = slot.install(addr(1), tx, CancellationToken::new()).await;

        let writer = tokio::spawn(async move {
            let command: ControlCommand = rx.recv().await.unwrap();
            let message = command.message.clone();
            command.reply.send(Ok(())).unwrap();
            message
        });

        let id = SessionId::from_parts(1, 2);
        handle.send_new_session(id).await.unwrap();
        assert_eq!(writer.await.unwrap(), Message::NewSession { session_id: id });
    }

    #[tokio::test]
    async fn test_send_fails_when_writer_gone() {
        let slot = ControlSlot::new();
        let (tx, rx) = mpsc::channel(1);
        let handle = slot.install(addr(1), tx, CancellationToken::new()).await;
        drop(rx);

        let result = handle.send_new_session(SessionId::from_parts(1, 2)).await;
        assert!(matches!(result, Err(ConnectionError::Lost(_))));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let slot = ControlSlot::new();
        let (tx, mut rx) = mpsc::channel(1);
        let handle = slot.install(addr(1), tx, CancellationToken::new()).await;

        tokio::spawn(async move {
            let command: ControlCommand = rx.recv().await.unwrap();
            let _ = command.reply.send(Err("broken pipe".to_string()));
        });

        let result = handle.send_new_session(SessionId::from_parts(1, 2)).await;
        assert!(matches!(result, Err(ConnectionError::Lost(reason)) if reason == "broken pipe"));
    }
}
