// crates/checked-download/src/error.rs
// ============================================================================
// Module: Download Errors
// Description: Failure taxonomy for checked downloads.
// Purpose: Let callers assert on a failure kind rather than on message text.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every failed download carries a [`DownloadErrorKind`], the URL and a
//! human-readable message that includes the underlying error chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Classified reason a download failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorKind {
    /// Body length violated the expected length for the mode.
    LengthMismatch,
    /// Connection, proxy or tunnel failure.
    Connection,
    /// TLS handshake or certificate verification failure.
    Tls,
    /// Request or body read exceeded the configured timeout.
    Timeout,
    /// Server answered with a non-success status.
    HttpStatus,
    /// Invalid URL, proxy URL or CA bundle.
    Config,
    /// Local spool file failure.
    Io,
}

impl DownloadErrorKind {
    /// Returns the stable label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LengthMismatch => "length_mismatch",
            Self::Connection => "connection",
            Self::Tls => "tls",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Config => "config",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for DownloadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Download Error
// ============================================================================

/// Download failure with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error downloading {url}: {message}")]
pub struct DownloadError {
    /// Classified failure reason.
    kind: DownloadErrorKind,
    /// URL that was requested.
    url: String,
    /// Message including the underlying error chain.
    message: String,
}

impl DownloadError {
    /// Creates a new download error.
    #[must_use]
    pub fn new(kind: DownloadErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> DownloadErrorKind {
        self.kind
    }

    /// Returns the requested URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
