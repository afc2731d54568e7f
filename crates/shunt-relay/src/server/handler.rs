//! Per-connection handlers
//!
//! Public connections become pending sessions and trigger a provisioning
//! request to the agent. Communicate connections declare themselves with a
//! handshake and become either the agent's control channel or the data
//! channel for one pending session.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use shunt_core::error::SessionError;
use shunt_core::transport::Incoming;
use shunt_core::{relay, ShuntError, Stream};
use shunt_protocol::{FrameCodec, Handshake, Message, SessionId};

use crate::connection::{ControlCommand, COMMAND_QUEUE_SIZE};
use crate::state::RelayState;

/// Handle a freshly accepted public client
///
/// Registers the connection as a pending session and asks the agent for a
/// data channel. The connection stays in the registry until the data
/// channel binds it or the session expires.
pub async fn handle_public(state: Arc<RelayState>, socket: TcpStream, peer_addr: SocketAddr) {
    let session_id = match state.sessions.create_session(socket) {
        Ok(id) => id,
        Err(rejected) => {
            tracing::warn!("Rejected client {}: {}", peer_addr, rejected.error);
            return;
        }
    };

    tracing::info!("Session {} created for client {}", session_id, peer_addr);

    let Some(control) = state.control.current().await else {
        fail_session(&state, session_id, peer_addr);
        return;
    };

    if let Err(e) = control.send_new_session(session_id).await {
        tracing::warn!(
            "Failed to request data channel for session {}: {}",
            session_id,
            e
        );
        if state.control.remove_if_current(control.generation).await {
            tracing::info!("Control channel from {} dropped", control.peer_addr);
        }
        fail_session(&state, session_id, peer_addr);
        return;
    }

    tracing::debug!("Requested data channel for session {}", session_id);
}

fn fail_session(state: &RelayState, session_id: SessionId, peer_addr: SocketAddr) {
    if let Some(socket) = state.sessions.fail_session(session_id) {
        tracing::warn!(
            "Closing client {} (session {}): {}",
            peer_addr,
            session_id,
            SessionError::NoAgentAvailable
        );
        drop(socket);
    }
}

/// Handle a connection on the communicate address
///
/// `shutdown` ends the control channel as soon as the relay stops;
/// `force_close` ends data channels once the drain period is over.
pub async fn handle_communicate(
    state: Arc<RelayState>,
    incoming: Incoming,
    shutdown: CancellationToken,
    force_close: CancellationToken,
) {
    let peer_addr = incoming.peer_addr();
    let timeout = state.config.handshake_timeout;

    let accepted = tokio::select! {
        _ = force_close.cancelled() => return,
        accepted = tokio::time::timeout(timeout, accept_handshake(incoming)) => accepted,
    };

    let (stream, handshake) = match accepted {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(e)) => {
            tracing::warn!("Rejected communicate connection from {}: {}", peer_addr, e);
            return;
        }
        Err(_) => {
            tracing::warn!(
                "Rejected communicate connection from {}: no handshake within {:?}",
                peer_addr,
                timeout
            );
            return;
        }
    };

    match handshake {
        Handshake::Control => run_control(&state, stream, peer_addr, shutdown).await,
        Handshake::Data(session_id) => {
            run_data(&state, stream, session_id, peer_addr, force_close).await
        }
    }
}

async fn accept_handshake(incoming: Incoming) -> Result<(Stream, Handshake), ShuntError> {
    let mut stream = incoming.establish().await?;
    let handshake = Handshake::read_from(&mut stream).await?;
    Ok((stream, handshake))
}

/// Serve the agent's control channel until it drops or is superseded
async fn run_control(
    state: &RelayState,
    stream: Stream,
    peer_addr: SocketAddr,
    shutdown: CancellationToken,
) {
    let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new()).split();
    let (command_tx, mut command_rx) = mpsc::channel::<ControlCommand>(COMMAND_QUEUE_SIZE);
    let cancel = shutdown.child_token();
    let handle = state
        .control
        .install(peer_addr, command_tx, cancel.clone())
        .await;
    let monitor = state.health_monitor();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut ticker = monitor.ticker();
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,

                _ = ticker.tick() => {
                    if let Err(e) = sink.send(monitor.heartbeat()).await {
                        tracing::debug!("Failed to send heartbeat to {}: {}", peer_addr, e);
                        break;
                    }
                }

                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    let result = sink.send(command.message).await.map_err(|e| e.to_string());
                    let failed = result.is_err();
                    let _ = command.reply.send(result);
                    if failed {
                        break;
                    }
                }
            }
        }
        writer_cancel.cancel();
    });

    let reason = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break "cancelled".to_string(),
            next = tokio::time::timeout(monitor.timeout, frames.next()) => next,
        };

        match next {
            Ok(Some(Ok(Message::HeartbeatAck { timestamp }))) => {
                tracing::trace!(
                    "Heartbeat ack from {}, latency={:?}",
                    peer_addr,
                    monitor.ack_latency(timestamp)
                );
            }
            Ok(Some(Ok(other))) => {
                tracing::warn!("Unexpected message from agent {}: {:?}", peer_addr, other);
            }
            Ok(Some(Err(e))) => break e.to_string(),
            Ok(None) => break "connection closed".to_string(),
            Err(_) => break format!("no frame within {:?}", monitor.timeout),
        }
    };

    cancel.cancel();
    let _ = writer.await;

    if state.control.remove_if_current(handle.generation).await {
        tracing::info!("Control channel from {} dropped: {}", peer_addr, reason);
    } else {
        tracing::debug!(
            "Control channel from {} (generation {}) ended: {}",
            peer_addr,
            handle.generation,
            reason
        );
    }
}

/// Bind a data channel to its pending session and relay until both sides close
async fn run_data(
    state: &RelayState,
    stream: Stream,
    session_id: SessionId,
    peer_addr: SocketAddr,
    force_close: CancellationToken,
) {
    let (public, data) = match state.sessions.bind_session(session_id, stream) {
        Ok(pair) => pair,
        Err(rejected) => {
            tracing::warn!(
                "Rejected data channel from {}: {}",
                peer_addr,
                rejected.error
            );
            return;
        }
    };

    tracing::info!("Session {} bound to data channel from {}", session_id, peer_addr);

    let stats = relay::run_until(public, data, state.relay_options(), force_close).await;
    tracing::info!(
        "Session {} closed ({} bytes client->agent, {} bytes agent->client)",
        session_id,
        stats.a_to_b,
        stats.b_to_a
    );
}
