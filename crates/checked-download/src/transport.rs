// crates/checked-download/src/transport.rs
// ============================================================================
// Module: Transport Environment
// Description: Proxy and trust-anchor inputs read from the process environment.
// Purpose: Resolve routing at call time instead of caching system proxies.
// Dependencies: reqwest
// ============================================================================

//! ## Overview
//! [`TransportEnv`] captures `HTTP_PROXY`, `HTTPS_PROXY` and
//! `REQUESTS_CA_BUNDLE`. Empty values count as unset. Values must be valid
//! UTF-8 so a malformed proxy never silently degrades to a direct connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use reqwest::Certificate;
use reqwest::Proxy;
use reqwest::blocking::ClientBuilder;

use crate::error::DownloadError;
use crate::error::DownloadErrorKind;

// ============================================================================
// SECTION: Variable Names
// ============================================================================

/// Proxy used for `http://` URLs.
pub const HTTP_PROXY_VAR: &str = "HTTP_PROXY";
/// Proxy used for `https://` URLs.
pub const HTTPS_PROXY_VAR: &str = "HTTPS_PROXY";
/// PEM bundle trusted in addition to the built-in roots.
pub const CA_BUNDLE_VAR: &str = "REQUESTS_CA_BUNDLE";

// ============================================================================
// SECTION: Transport Environment
// ============================================================================

/// Routing inputs for a single download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportEnv {
    /// Proxy URL for plain HTTP targets.
    pub http_proxy: Option<String>,
    /// Proxy URL for HTTPS targets.
    pub https_proxy: Option<String>,
    /// Extra trust anchors in PEM form.
    pub ca_bundle: Option<PathBuf>,
}

impl TransportEnv {
    /// Reads routing inputs from the current process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadErrorKind::Config`] error when a variable is not
    /// valid UTF-8.
    pub fn from_env() -> Result<Self, DownloadError> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Reads routing inputs through a caller-supplied lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadErrorKind::Config`] error when a value is not
    /// valid UTF-8.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DownloadError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        Ok(Self {
            http_proxy: read_nonempty(&lookup, HTTP_PROXY_VAR)?,
            https_proxy: read_nonempty(&lookup, HTTPS_PROXY_VAR)?,
            ca_bundle: read_nonempty(&lookup, CA_BUNDLE_VAR)?.map(PathBuf::from),
        })
    }

    /// Applies proxies and trust anchors to a client builder.
    ///
    /// System proxy detection is disabled first so only these inputs apply.
    pub(crate) fn configure(
        &self,
        builder: ClientBuilder,
        url: &str,
    ) -> Result<ClientBuilder, DownloadError> {
        let mut builder = builder.no_proxy();
        if let Some(proxy) = &self.http_proxy {
            let proxy = Proxy::http(proxy.as_str()).map_err(|err| {
                config_error(url, format!("invalid {HTTP_PROXY_VAR} {proxy}: {err}"))
            })?;
            builder = builder.proxy(proxy);
        }
        if let Some(proxy) = &self.https_proxy {
            let proxy = Proxy::https(proxy.as_str()).map_err(|err| {
                config_error(url, format!("invalid {HTTPS_PROXY_VAR} {proxy}: {err}"))
            })?;
            builder = builder.proxy(proxy);
        }
        if let Some(path) = &self.ca_bundle {
            let pem = fs::read(path).map_err(|err| {
                config_error(url, format!("failed to read {}: {err}", path.display()))
            })?;
            let certificates = Certificate::from_pem_bundle(&pem).map_err(|err| {
                config_error(url, format!("invalid ca bundle {}: {err}", path.display()))
            })?;
            if certificates.is_empty() {
                return Err(config_error(
                    url,
                    format!("ca bundle {} holds no certificates", path.display()),
                ));
            }
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
        Ok(builder)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a UTF-8 variable, treating empty values as unset.
fn read_nonempty<F>(lookup: &F, name: &str) -> Result<Option<String>, DownloadError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    let value = value
        .into_string()
        .map_err(|_| config_error("", format!("{name} must be valid UTF-8")))?;
    let trimmed = value.trim();
    if trimmed.is_empty() { Ok(None) } else { Ok(Some(trimmed.to_string())) }
}

/// Builds a configuration error.
fn config_error(url: &str, message: String) -> DownloadError {
    DownloadError::new(DownloadErrorKind::Config, url, message)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
