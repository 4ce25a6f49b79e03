// crates/checked-download/src/classify.rs
// ============================================================================
// Module: Transport Error Classification
// Description: Maps reqwest and I/O failures onto download error kinds.
// Purpose: Distinguish TLS trust failures from tunnel and connect failures.
// Dependencies: reqwest, rustls
// ============================================================================

//! ## Overview
//! The classifier walks the full error source chain. A `rustls::Error`
//! anywhere in the chain, including inside a `std::io::Error` payload, means
//! TLS, as does rustls failure wording in a source below the top-level
//! message. Timeouts win over everything else. All remaining transport failures,
//! including a proxy refusing a CONNECT tunnel, are connection failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as StdError;
use std::io;

use crate::error::DownloadError;
use crate::error::DownloadErrorKind;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// rustls failure wording accepted when the typed error is not reachable.
const TLS_FAILURE_PHRASES: [&str; 3] =
    ["invalid peer certificate", "received fatal alert", "peer is incompatible"];

/// Classifies a failed request or body read from reqwest.
#[must_use]
pub fn classify_reqwest(url: &str, err: &reqwest::Error) -> DownloadError {
    let kind = if err.is_timeout() || chain_has_timeout(err) {
        DownloadErrorKind::Timeout
    } else if is_tls_failure(err) {
        DownloadErrorKind::Tls
    } else if err.is_builder() {
        DownloadErrorKind::Config
    } else {
        DownloadErrorKind::Connection
    };
    DownloadError::new(kind, url, error_chain(err))
}

/// Classifies a failure raised while streaming the response body.
#[must_use]
pub fn classify_body_io(url: &str, err: &io::Error) -> DownloadError {
    if let Some(inner) = err.get_ref()
        && let Some(reqwest_err) = inner.downcast_ref::<reqwest::Error>()
    {
        return classify_reqwest(url, reqwest_err);
    }
    let kind = if err.kind() == io::ErrorKind::TimedOut || chain_has_timeout(err) {
        DownloadErrorKind::Timeout
    } else if is_tls_failure(err) {
        DownloadErrorKind::Tls
    } else {
        DownloadErrorKind::Connection
    };
    DownloadError::new(kind, url, error_chain(err))
}

/// Returns true when the chain carries a TLS failure.
#[must_use]
pub fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(node) = current {
        if node.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        if let Some(io_err) = node.downcast_ref::<io::Error>()
            && let Some(inner) = io_err.get_ref()
            && (inner.downcast_ref::<rustls::Error>().is_some() || is_tls_failure(inner))
        {
            return true;
        }
        current = node.source();
    }
    sources_mention_tls(err)
}

/// Returns true when a source below `err` carries rustls failure wording.
///
/// The top-level message is skipped because reqwest embeds the request URL
/// there.
fn sources_mention_tls(err: &(dyn StdError + 'static)) -> bool {
    let mut current = err.source();
    while let Some(node) = current {
        let text = node.to_string().to_ascii_lowercase();
        if TLS_FAILURE_PHRASES.iter().any(|phrase| text.contains(phrase)) {
            return true;
        }
        current = node.source();
    }
    false
}

/// Renders the error and its sources joined by `": "`.
#[must_use]
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(node) = current {
        let text = node.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        current = node.source();
    }
    rendered
}

/// Returns true when any node is an I/O timeout.
fn chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(node) = current {
        if let Some(io_err) = node.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::TimedOut
        {
            return true;
        }
        current = node.source();
    }
    false
}

// ============================================================================
// SECTION: Tests
// ============================================================================
