//! TLS-specific error types

use std::path::PathBuf;
use thiserror::Error;

/// TLS-specific errors
#[derive(Error, Debug)]
pub enum TlsError {
    /// Failed to load certificate from file
    #[error("Failed to load certificate from {path}: {reason}")]
    CertificateLoad {
        /// Path to the certificate file
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// Failed to load private key from file
    #[error("Failed to load private key from {path}: {reason}")]
    PrivateKeyLoad {
        /// Path to the key file
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    Config(String),
}

impl TlsError {
    /// Create a certificate load error
    pub fn cert_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TlsError::CertificateLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a private key load error
    pub fn key_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TlsError::PrivateKeyLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a handshake error
    pub fn handshake(reason: impl Into<String>) -> Self {
        TlsError::Handshake(reason.into())
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        TlsError::Config(reason.into())
    }
}
