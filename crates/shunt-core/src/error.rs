//! Core error types for shunt

use shunt_protocol::{ProtocolError, SessionId};
use std::path::PathBuf;
use thiserror::Error;

use crate::tls::TlsError;

/// Top-level error type for the shunt ecosystem
#[derive(Error, Debug)]
pub enum ShuntError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection refused or unreachable
    #[error("Connection to {addr} failed: {source}")]
    Refused {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connect attempt did not finish in time
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// Connection lost
    #[error("Connection lost: {0}")]
    Lost(String),

    /// Peer sent an invalid handshake or none at all
    #[error("Handshake failed: {0}")]
    Handshake(String),
}

/// Session lifecycle errors
///
/// None of these are fatal to the relay: each one is resolved by closing the
/// affected connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No pending session with this id (unknown, expired or already closed)
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// A data channel was already bound to this session
    #[error("Session already bound: {0}")]
    AlreadyBound(SessionId),

    /// No agent control channel is registered
    #[error("No agent available")]
    NoAgentAvailable,

    /// The agent did not deliver a data channel in time
    #[error("Provisioning timed out for session {0}")]
    ProvisioningTimeout(SessionId),

    /// Too many sessions are waiting for a data channel
    #[error("Pending session limit exceeded ({0})")]
    LimitExceeded(usize),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Malformed address or URL
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}
