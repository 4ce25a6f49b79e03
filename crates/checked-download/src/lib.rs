// crates/checked-download/src/lib.rs
// ============================================================================
// Module: Checked Download
// Description: Length-validated HTTP(S) downloads with explicit proxy routing.
// Purpose: Fetch a file whose expected length is known ahead of time.
// Dependencies: reqwest, rustls, tempfile, url
// ============================================================================

//! ## Overview
//! This crate downloads a URL into an anonymous temporary file while enforcing
//! an expected length. Two modes exist:
//! - [`safe_download`] treats the expected length as exact and rejects both
//!   short and long bodies.
//! - [`unsafe_download`] treats the expected length as an upper bound. Reading
//!   stops at the bound and a shorter body is accepted and reported.
//!
//! Proxy routing and extra trust anchors come from `HTTP_PROXY`,
//! `HTTPS_PROXY` and `REQUESTS_CA_BUNDLE`, read at call time. `NO_PROXY` and
//! lowercase variants are ignored so callers control routing completely.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod classify;
pub mod download;
pub mod error;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use download::Download;
pub use download::DownloadConfig;
pub use download::DownloadMode;
pub use download::DownloadReport;
pub use download::Downloader;
pub use download::safe_download;
pub use download::unsafe_download;
pub use error::DownloadError;
pub use error::DownloadErrorKind;
pub use transport::CA_BUNDLE_VAR;
pub use transport::HTTP_PROXY_VAR;
pub use transport::HTTPS_PROXY_VAR;
pub use transport::TransportEnv;
