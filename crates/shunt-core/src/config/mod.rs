//! Configuration management for shunt

mod address;
mod agent;
mod relay;
pub mod serde_utils;

pub use address::{CommunicateUrl, Scheme};
pub use agent::{AgentConfig, BackoffConfig};
pub use relay::RelayConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shunt")
}

/// Default relay configuration file path
pub fn default_relay_config_path() -> PathBuf {
    default_config_dir().join("relay.toml")
}

/// Default agent configuration file path
pub fn default_agent_config_path() -> PathBuf {
    default_config_dir().join("agent.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}
