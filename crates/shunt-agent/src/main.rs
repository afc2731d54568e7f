//! shunt agent daemon
//!
//! Runs next to the private service and connects out to the relay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shunt_agent::Agent;
use shunt_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "shunt-agent")]
#[command(about = "shunt agent - connects a private service to a relay")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SHUNT_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Relay communicate address, e.g. relay.example.com:10443
    #[arg(long)]
    communicate_url: Option<String>,

    /// Local service to expose, e.g. 127.0.0.1:22
    #[arg(short, long)]
    target: Option<String>,

    /// Dial the relay over TLS
    #[arg(long)]
    ssl: bool,

    /// Relay certificate to trust (PEM)
    #[arg(long)]
    ssl_cert: Option<PathBuf>,

    /// Name to verify the relay certificate against
    #[arg(long)]
    server_name: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(self, mut config: AgentConfig) -> AgentConfig {
        if let Some(url) = self.communicate_url {
            config.communicate_url = url;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if self.ssl {
            config.ssl = true;
        }
        if let Some(cert) = self.ssl_cert {
            config.ssl_cert = Some(cert);
        }
        if let Some(name) = self.server_name {
            config.server_name = Some(name);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("shunt agent starting...");

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_agent_config_path();
        if default_path.exists() {
            config::load_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        } else {
            tracing::info!("Using default configuration");
            AgentConfig::default()
        }
    };
    let config = args.apply(config);

    tracing::info!(
        "Exposing {} through relay {}",
        config.target,
        config.communicate_url
    );

    let agent = Agent::new(config).context("Failed to create agent")?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;
        tokio::spawn(async move {
            terminate.recv().await;
            tracing::info!("Received SIGTERM, initiating shutdown...");
            cancel_clone.cancel();
        });
    }

    agent.run(cancel).await;
    Ok(())
}
