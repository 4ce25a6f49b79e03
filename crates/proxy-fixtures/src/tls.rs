// crates/proxy-fixtures/src/tls.rs
// ============================================================================
// Module: Fixture TLS
// Description: PEM loading for fixture server identities.
// Purpose: Build rustls acceptors for the HTTPS origin and intercepting proxy.
// Dependencies: rustls, rustls-pki-types, tokio-rustls
// ============================================================================

//! ## Overview
//! Server identities are read from PEM files on disk. The crypto provider is
//! passed explicitly so the configuration does not depend on a process-wide
//! default provider being installed. Only HTTP/1.1 is offered via ALPN.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::aws_lc_rs;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use tokio_rustls::TlsAcceptor;

use crate::error::FixtureError;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Certificate chain and private key paths for a TLS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    /// PEM certificate chain, leaf first.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
}

impl TlsIdentity {
    /// Creates an identity from certificate and key paths.
    #[must_use]
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads a rustls server configuration for `identity`.
///
/// # Errors
///
/// Returns [`FixtureError::Tls`] when the files are unreadable, hold no
/// certificate, or do not form a usable identity.
pub fn load_server_config(identity: &TlsIdentity) -> Result<Arc<ServerConfig>, FixtureError> {
    let certs = load_certificates(&identity.cert)?;
    let key = PrivateKeyDer::from_pem_file(&identity.key)
        .map_err(|err| FixtureError::Tls(format!("{}: {err}", identity.key.display())))?;
    let mut config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|err| FixtureError::Tls(err.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| FixtureError::Tls(format!("{}: {err}", identity.cert.display())))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Builds a TLS acceptor for `identity`.
///
/// # Errors
///
/// Returns [`FixtureError::Tls`] when the identity cannot be loaded.
pub fn tls_acceptor(identity: &TlsIdentity) -> Result<TlsAcceptor, FixtureError> {
    load_server_config(identity).map(TlsAcceptor::from)
}

/// Reads every certificate in a PEM file.
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, FixtureError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|err| FixtureError::Tls(format!("{}: {err}", path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| FixtureError::Tls(format!("{}: {err}", path.display())))?;
    if certs.is_empty() {
        return Err(FixtureError::Tls(format!("{}: no certificates found", path.display())));
    }
    Ok(certs)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
