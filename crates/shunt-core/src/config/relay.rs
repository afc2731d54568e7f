//! Relay configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::address::CommunicateUrl;
use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;

/// Configuration for the public relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Address public clients connect to
    pub listen_on: String,

    /// Address the agent dials for control and data channels
    pub communicate_url: String,

    /// Serve the communicate channel over TLS
    pub ssl: bool,

    /// Certificate chain (PEM) presented when `ssl` is enabled
    pub ssl_cert: Option<PathBuf>,

    /// Private key (PEM) matching `ssl_cert`
    pub ssl_key: Option<PathBuf>,

    /// How long a public client may wait for its data channel
    #[serde(with = "duration_secs")]
    pub provisioning_timeout: Duration,

    /// How long a communicate connection may take to send its handshake
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// Interval between sweeps of expired pending sessions
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,

    /// Heartbeat interval on the control channel
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Heartbeat timeout (how long to wait before considering the agent dead)
    #[serde(with = "duration_secs")]
    pub heartbeat_timeout: Duration,

    /// Maximum number of sessions waiting for a data channel
    pub max_pending_sessions: Option<usize>,

    /// Close a relayed pair after this long without traffic in a direction
    #[serde(with = "option_duration_secs")]
    pub idle_timeout: Option<Duration>,

    /// How long in-flight relay pairs may keep running after shutdown starts
    #[serde(with = "duration_secs")]
    pub drain_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_on: "0.0.0.0:10000".to_string(),
            communicate_url: "0.0.0.0:10443".to_string(),
            ssl: false,
            ssl_cert: None,
            ssl_key: None,
            provisioning_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            max_pending_sessions: None,
            idle_timeout: None,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Parsed communicate URL
    pub fn communicate_address(&self) -> Result<CommunicateUrl, ConfigError> {
        CommunicateUrl::parse(&self.communicate_url)
    }

    /// Whether the communicate channel is served over TLS
    pub fn tls_enabled(&self) -> bool {
        self.ssl
    }

    /// Check the configuration for contradictions
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.communicate_address()?;

        if self.listen_on.trim().is_empty() {
            return Err(ConfigError::MissingField("listen-on".to_string()));
        }

        if self.tls_enabled() {
            if self.ssl_cert.is_none() {
                return Err(ConfigError::MissingField("ssl-cert".to_string()));
            }
            if self.ssl_key.is_none() {
                return Err(ConfigError::MissingField("ssl-key".to_string()));
            }
        }

        if self.provisioning_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "provisioning-timeout must be greater than zero".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sweep-interval must be greater than zero".to_string(),
            ));
        }

        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(ConfigError::Invalid(format!(
                "heartbeat-timeout ({:?}) must exceed heartbeat-interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        RelayConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_kebab_case_toml() {
        let config: RelayConfig = toml::from_str(
            r#"
            listen-on = "0.0.0.0:2222"
            communicate-url = "https://0.0.0.0:10443"
            ssl = true
            ssl-cert = "/etc/shunt/cert.pem"
            ssl-key = "/etc/shunt/key.pem"
            provisioning-timeout = 3
            max-pending-sessions = 128
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_on, "0.0.0.0:2222");
        assert!(config.ssl);
        assert_eq!(config.provisioning_timeout, Duration::from_secs(3));
        assert_eq!(config.max_pending_sessions, Some(128));
        // Unset keys keep their defaults
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_tls_requires_credentials() {
        let config = RelayConfig {
            ssl: true,
            ssl_cert: Some(PathBuf::from("cert.pem")),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(field)) if field == "ssl-key"
        ));
    }

    #[test]
    fn test_ssl_flag_enables_tls() {
        let config = RelayConfig {
            ssl: true,
            ..Default::default()
        };
        assert!(config.tls_enabled());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(field)) if field == "ssl-cert"
        ));
    }

    #[test]
    fn test_https_scheme_without_ssl_stays_plain() {
        let config = RelayConfig {
            communicate_url: "https://localhost:10443".to_string(),
            ssl: false,
            ..Default::default()
        };
        assert!(!config.tls_enabled());
        config.validate().unwrap();
        assert_eq!(
            config.communicate_address().unwrap().socket_address(),
            "localhost:10443"
        );
    }

    #[test]
    fn test_heartbeat_timeout_must_exceed_interval() {
        let config = RelayConfig {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
