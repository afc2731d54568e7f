//! TLS support for the communicate channel
//!
//! The relay terminates TLS on its communicate address with a certificate
//! and key loaded from PEM files; the agent wraps both its control channel
//! and every data channel in TLS. Public client connections and the
//! agent-to-target hop stay plain TCP.
//!
//! Uses rustls with the ring provider, TLS 1.2 minimum.

mod acceptor;
mod connector;
mod error;

pub use acceptor::TlsAcceptor;
pub use connector::TlsConnector;
pub use error::TlsError;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load certificates from a PEM file
///
/// Returns every certificate in the file, so chains are supported.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::cert_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::cert_load(path, e.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::cert_load(path, "no certificates found in file"));
    }

    Ok(certs)
}

/// Load a private key from a PEM file (RSA, PKCS8 or EC)
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::key_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::key_load(path, e.to_string()))?
        .ok_or_else(|| TlsError::key_load(path, "no private key found in file"))
}
