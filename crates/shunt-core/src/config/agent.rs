//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::address::CommunicateUrl;
use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;

/// Configuration for the private-side agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AgentConfig {
    /// Relay communicate address to dial
    pub communicate_url: String,

    /// Local service that public clients are bridged to
    pub target: String,

    /// Dial the relay over TLS
    pub ssl: bool,

    /// Certificate (PEM) to trust for the relay.
    ///
    /// When unset with `ssl` enabled, any relay certificate is accepted and
    /// the tunnel is encrypted but not authenticated.
    pub ssl_cert: Option<PathBuf>,

    /// Name to verify the relay certificate against (defaults to the URL host)
    pub server_name: Option<String>,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,

    /// Connection timeout for every outbound dial
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Give up on a silent control channel after this long
    #[serde(with = "duration_secs")]
    pub heartbeat_timeout: Duration,

    /// Close a relayed pair after this long without traffic in a direction
    #[serde(with = "option_duration_secs")]
    pub idle_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            communicate_url: "127.0.0.1:10443".to_string(),
            target: "127.0.0.1:22".to_string(),
            ssl: false,
            ssl_cert: None,
            server_name: None,
            backoff: BackoffConfig::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }
}

impl AgentConfig {
    /// Parsed communicate URL
    pub fn communicate_address(&self) -> Result<CommunicateUrl, ConfigError> {
        CommunicateUrl::parse(&self.communicate_url)
    }

    /// Whether the relay is dialed over TLS
    pub fn tls_enabled(&self) -> bool {
        self.ssl
    }

    /// Name presented for SNI and certificate verification
    pub fn tls_server_name(&self) -> Result<String, ConfigError> {
        match &self.server_name {
            Some(name) => Ok(name.clone()),
            None => Ok(self.communicate_address()?.host),
        }
    }

    /// Check the configuration for contradictions
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.communicate_address()?;

        if self.target.trim().is_empty() {
            return Err(ConfigError::MissingField("target".to_string()));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "connect-timeout must be greater than zero".to_string(),
            ));
        }

        self.backoff.validate()
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Check the backoff parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "backoff.multiplier must be a finite number of at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(
                "backoff.jitter must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.max < self.initial {
            return Err(ConfigError::Invalid(
                "backoff.max must not be smaller than backoff.initial".to_string(),
            ));
        }
        Ok(())
    }
}
