//! shunt relay daemon
//!
//! Runs on a public host and exposes the service behind a connected agent.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shunt_core::config::{self, RelayConfig};
use shunt_relay::RelayServer;

#[derive(Parser)]
#[command(name = "shunt-relay")]
#[command(about = "shunt relay daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SHUNT_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address public clients connect to (overrides config)
    #[arg(long)]
    listen_on: Option<String>,

    /// Address the agent connects to (overrides config)
    #[arg(long)]
    communicate_url: Option<String>,

    /// Serve the communicate channel over TLS
    #[arg(long)]
    ssl: bool,

    /// TLS certificate chain (PEM)
    #[arg(long)]
    ssl_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    ssl_key: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(self, mut config: RelayConfig) -> RelayConfig {
        if let Some(listen_on) = self.listen_on {
            config.listen_on = listen_on;
        }
        if let Some(url) = self.communicate_url {
            config.communicate_url = url;
        }
        if self.ssl {
            config.ssl = true;
        }
        if let Some(cert) = self.ssl_cert {
            config.ssl_cert = Some(cert);
        }
        if let Some(key) = self.ssl_key {
            config.ssl_key = Some(key);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("shunt relay starting...");

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_relay_config_path();
        if default_path.exists() {
            config::load_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        } else {
            tracing::info!("Using default configuration");
            RelayConfig::default()
        }
    };
    let config = args.apply(config);

    let server = RelayServer::bind(config).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    server.run(cancel).await?;
    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}
