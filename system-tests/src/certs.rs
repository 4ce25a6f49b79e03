// system-tests/src/certs.rs
// ============================================================================
// Module: TLS Fixtures
// Description: Ephemeral certificate authorities and server identities.
// Purpose: Avoid committing private keys while enabling HTTPS and interception.
// Dependencies: rcgen
// ============================================================================

//! ## Overview
//! Each suite generates two independent authorities into `ssl_certs/` inside
//! its served directory:
//! - the origin authority (`ssl_cert.crt`) issuing the HTTPS origin identity
//!   (`ssl_server.crt`, `ssl_server.key`);
//! - the proxy authority (`proxy_ca.crt`) issuing the intercepting proxy
//!   identity (`proxy_server.crt`, `proxy_server.key`).
//!
//! Both leaves are valid for `localhost` and `127.0.0.1`. Keeping the
//! authorities separate is what lets a client trusting only one of them
//! detect the other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Directory, relative to the served root, holding generated TLS assets.
pub const CERT_DIR: &str = "ssl_certs";

/// Paths of the generated TLS assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    /// Directory holding every asset.
    pub dir: PathBuf,
    /// Trust anchor for the HTTPS origin.
    pub origin_ca: PathBuf,
    /// HTTPS origin certificate.
    pub origin_cert: PathBuf,
    /// HTTPS origin private key.
    pub origin_key: PathBuf,
    /// Trust anchor for the intercepting proxy.
    pub proxy_ca: PathBuf,
    /// Intercepting proxy certificate.
    pub proxy_cert: PathBuf,
    /// Intercepting proxy private key.
    pub proxy_key: PathBuf,
}

impl CertificatePaths {
    /// Returns the asset layout under `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        let dir = root.join(CERT_DIR);
        Self {
            origin_ca: dir.join("ssl_cert.crt"),
            origin_cert: dir.join("ssl_server.crt"),
            origin_key: dir.join("ssl_server.key"),
            proxy_ca: dir.join("proxy_ca.crt"),
            proxy_cert: dir.join("proxy_server.crt"),
            proxy_key: dir.join("proxy_server.key"),
            dir,
        }
    }
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Generates both authorities and their leaves under `root/ssl_certs`.
///
/// # Errors
///
/// Returns [`HarnessError::Certificates`] when key or certificate generation
/// fails and [`HarnessError::Io`] when the files cannot be written.
pub fn generate_certificates(root: &Path) -> Result<CertificatePaths, HarnessError> {
    let paths = CertificatePaths::under(root);
    fs::create_dir_all(&paths.dir)?;
    write_authority("Proxy Harness Origin", &paths.origin_ca, &paths.origin_cert, &paths.origin_key)?;
    write_authority("Proxy Harness Interceptor", &paths.proxy_ca, &paths.proxy_cert, &paths.proxy_key)?;
    Ok(paths)
}

/// Writes a CA certificate and a loopback leaf signed by it.
fn write_authority(
    label: &str,
    ca_path: &Path,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), HarnessError> {
    let ca_key = KeyPair::generate().map_err(cert_error)?;
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name = distinguished_name(&format!("{label} CA"));
    let ca_cert = ca_params.self_signed(&ca_key).map_err(cert_error)?;
    let issuer = Issuer::new(ca_params, ca_key);

    let leaf_key = KeyPair::generate().map_err(cert_error)?;
    let mut leaf_params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
        .map_err(cert_error)?;
    leaf_params.is_ca = IsCa::NoCa;
    leaf_params.distinguished_name = distinguished_name(&format!("{label} Server"));
    let leaf_cert = leaf_params.signed_by(&leaf_key, &issuer).map_err(cert_error)?;

    fs::write(ca_path, ca_cert.pem())?;
    fs::write(cert_path, leaf_cert.pem())?;
    fs::write(key_path, leaf_key.serialize_pem())?;
    Ok(())
}

/// Builds a distinguished name with only a common name.
fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name
}

/// Maps an rcgen failure to a harness error.
fn cert_error(err: rcgen::Error) -> HarnessError {
    HarnessError::Certificates(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::fs;

    use super::CERT_DIR;
    use super::generate_certificates;

    #[test]
    fn writes_every_asset_under_cert_dir() {
        let root = tempfile::tempdir().unwrap();
        let paths = generate_certificates(root.path()).unwrap();
        assert_eq!(paths.dir, root.path().join(CERT_DIR));
        for path in [
            &paths.origin_ca,
            &paths.origin_cert,
            &paths.origin_key,
            &paths.proxy_ca,
            &paths.proxy_cert,
            &paths.proxy_key,
        ] {
            assert!(path.starts_with(&paths.dir));
            let text = fs::read_to_string(path).unwrap();
            assert!(text.starts_with("-----BEGIN"), "{} is not PEM", path.display());
        }
        assert!(fs::read_to_string(&paths.origin_key).unwrap().contains("PRIVATE KEY"));
    }

    #[test]
    fn authorities_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let paths = generate_certificates(root.path()).unwrap();
        let origin = fs::read_to_string(&paths.origin_ca).unwrap();
        let proxy = fs::read_to_string(&paths.proxy_ca).unwrap();
        assert_ne!(origin, proxy);
    }
}
