//! Relay listeners
//!
//! Runs the public accept loop, the communicate accept loop and the session
//! sweep, spawning a handler task for each accepted connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use shunt_core::config::RelayConfig;
use shunt_core::tls::TlsAcceptor;
use shunt_core::Listener;

use crate::server::handler::{handle_communicate, handle_public};
use crate::session::run_sweep;
use crate::state::RelayState;

/// Relay server bound to its public and communicate addresses
pub struct RelayServer {
    /// Shared relay state
    state: Arc<RelayState>,
    /// Listener for public clients
    public: Listener,
    /// Listener for the agent's control and data channels
    communicate: Listener,
    /// Connection handler tasks, waited on during shutdown
    tasks: TaskTracker,
}

impl RelayServer {
    /// Bind both listeners
    ///
    /// Fails if the configuration is invalid, TLS credentials cannot be
    /// loaded, or either address cannot be bound.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        config.validate().context("Invalid relay configuration")?;

        let communicate_url = config.communicate_address()?;
        let tls = if config.tls_enabled() {
            let cert = config
                .ssl_cert
                .as_deref()
                .context("ssl-cert is required when TLS is enabled")?;
            let key = config
                .ssl_key
                .as_deref()
                .context("ssl-key is required when TLS is enabled")?;
            let acceptor = TlsAcceptor::from_pem_files(cert, key)
                .with_context(|| format!("Failed to load TLS credentials from {:?}", cert))?;
            Some(acceptor)
        } else {
            None
        };

        let public = Listener::bind(&config.listen_on, None)
            .await
            .with_context(|| format!("Failed to bind to {}", config.listen_on))?;

        let communicate_addr = communicate_url.socket_address();
        let communicate = Listener::bind(&communicate_addr, tls)
            .await
            .with_context(|| format!("Failed to bind to {}", communicate_addr))?;

        Ok(Self {
            state: Arc::new(RelayState::new(config)),
            public,
            communicate,
            tasks: TaskTracker::new(),
        })
    }

    /// Address public clients connect to
    pub fn public_addr(&self) -> io::Result<SocketAddr> {
        self.public.local_addr()
    }

    /// Address the agent connects to
    pub fn communicate_addr(&self) -> io::Result<SocketAddr> {
        self.communicate.local_addr()
    }

    /// Get the shared state
    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Run the relay until `cancel` fires
    ///
    /// After cancellation the listeners stop accepting, the control channel
    /// is dropped and pending sessions are discarded. Relay pairs already
    /// running get up to `drain-timeout` to finish; any still open after
    /// that are closed before this returns.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            "Relay listening on {} (public) and {} (communicate{})",
            self.public_addr()?,
            self.communicate_addr()?,
            if self.communicate.is_tls() { ", TLS" } else { "" }
        );

        let sweep = tokio::spawn(run_sweep(
            Arc::clone(&self.state.sessions),
            self.state.config.sweep_interval,
            cancel.clone(),
        ));

        let force_close = CancellationToken::new();
        tokio::join!(
            self.public_loop(&cancel),
            self.communicate_loop(&cancel, &force_close)
        );

        self.state.control.clear().await;
        let _ = sweep.await;

        self.tasks.close();
        if !self.tasks.is_empty() {
            tracing::info!("Waiting for {} connections to drain", self.tasks.len());
        }
        if tokio::time::timeout(self.state.config.drain_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                "{} connections still open after {:?}, closing them",
                self.tasks.len(),
                self.state.config.drain_timeout
            );
            force_close.cancel();
            self.tasks.wait().await;
        }

        tracing::info!("Relay shutdown complete");
        Ok(())
    }

    async fn public_loop(&self, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Public listener shutting down");
                    break;
                }

                result = self.public.accept() => {
                    match result {
                        Ok(incoming) => {
                            let peer_addr = incoming.peer_addr();
                            tracing::debug!("New client from {}", peer_addr);
                            let state = Arc::clone(&self.state);
                            self.tasks
                                .spawn(handle_public(state, incoming.into_tcp(), peer_addr));
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept client connection: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn communicate_loop(&self, cancel: &CancellationToken, force_close: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Communicate listener shutting down");
                    break;
                }

                result = self.communicate.accept() => {
                    match result {
                        Ok(incoming) => {
                            tracing::debug!("New communicate connection from {}", incoming.peer_addr());
                            let state = Arc::clone(&self.state);
                            self.tasks.spawn(handle_communicate(
                                state,
                                incoming,
                                cancel.clone(),
                                force_close.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept communicate connection: {}", e);
                        }
                    }
                }
            }
        }
    }
}
