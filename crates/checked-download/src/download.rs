// crates/checked-download/src/download.rs
// ============================================================================
// Module: Checked Download Routine
// Description: Strict and upper-bound downloads spooled to a temporary file.
// Purpose: Enforce the expected length while the body streams in.
// Dependencies: reqwest, tempfile, url
// ============================================================================

//! ## Overview
//! The downloader builds a fresh blocking client per call so environment
//! changes between calls take effect immediately. Redirects are not followed
//! and a non-success status fails the download. The body is read through a
//! bounded reader:
//! - strict mode reads at most `expected + 1` bytes and requires exactly
//!   `expected`;
//! - upper-bound mode reads at most `expected` bytes and accepts fewer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::Serialize;
use url::Url;

use crate::classify::classify_body_io;
use crate::classify::classify_reqwest;
use crate::error::DownloadError;
use crate::error::DownloadErrorKind;
use crate::transport::TransportEnv;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Length enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Body must be exactly the expected length.
    Safe,
    /// Expected length is an upper bound; shorter bodies are accepted.
    Unsafe,
}

impl DownloadMode {
    /// Both modes in the order callers normally exercise them.
    pub const ALL: [Self; 2] = [Self::Safe, Self::Unsafe];

    /// Returns the stable label for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client settings for downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Total request timeout, including the body.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "checked-download/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Summary of a completed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// URL that was fetched.
    pub url: String,
    /// Mode used for length enforcement.
    pub mode: DownloadMode,
    /// Expected length supplied by the caller.
    pub expected_length: u64,
    /// Bytes written to the spool file.
    pub bytes_received: u64,
    /// `Content-Length` announced by the server, if any.
    pub reported_length: Option<u64>,
    /// Upper-bound mode stopped reading at the bound.
    pub truncated: bool,
}

impl DownloadReport {
    /// Returns true when fewer bytes than expected were received.
    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.bytes_received < self.expected_length
    }
}

/// Downloaded body and its report.
#[derive(Debug)]
pub struct Download {
    /// Anonymous spool file positioned at the start.
    file: File,
    /// Download summary.
    report: DownloadReport,
}

impl Download {
    /// Returns the download summary.
    #[must_use]
    pub const fn report(&self) -> &DownloadReport {
        &self.report
    }

    /// Returns the number of bytes received.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.report.bytes_received
    }

    /// Returns true when the body was empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.report.bytes_received == 0
    }

    /// Reads the whole body from the spool file.
    ///
    /// # Errors
    ///
    /// Returns an error when the spool file cannot be read.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(bytes)
    }

    /// Consumes the download and returns the spool file.
    #[must_use]
    pub fn into_file(self) -> File {
        self.file
    }
}

// ============================================================================
// SECTION: Downloader
// ============================================================================

/// Length-checked downloader.
#[derive(Debug, Clone, Default)]
pub struct Downloader {
    /// Client settings.
    config: DownloadConfig,
}

impl Downloader {
    /// Creates a downloader with the given settings.
    #[must_use]
    pub const fn new(config: DownloadConfig) -> Self {
        Self {
            config,
        }
    }

    /// Returns the client settings.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads `url`, routing through the proxies named in the environment.
    ///
    /// # Errors
    ///
    /// Returns a classified [`DownloadError`] on any failure.
    pub fn download(
        &self,
        url: &str,
        expected_length: u64,
        mode: DownloadMode,
    ) -> Result<Download, DownloadError> {
        let transport = TransportEnv::from_env()
            .map_err(|err| DownloadError::new(err.kind(), url, err.message()))?;
        self.download_with(url, expected_length, mode, &transport)
    }

    /// Downloads `url` with explicit routing inputs.
    ///
    /// # Errors
    ///
    /// Returns a classified [`DownloadError`] on any failure.
    pub fn download_with(
        &self,
        url: &str,
        expected_length: u64,
        mode: DownloadMode,
        transport: &TransportEnv,
    ) -> Result<Download, DownloadError> {
        let parsed = parse_url(url)?;
        let client = self.client(transport, url)?;
        let mut response =
            client.get(parsed).send().map_err(|err| classify_reqwest(url, &err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::new(
                DownloadErrorKind::HttpStatus,
                url,
                format!("server answered {status}"),
            ));
        }
        let reported_length = response.content_length();

        let mut file = tempfile::tempfile().map_err(|err| io_error(url, &err))?;
        let limit = match mode {
            DownloadMode::Safe => expected_length.saturating_add(1),
            DownloadMode::Unsafe => expected_length,
        };
        let mut bounded = Read::by_ref(&mut response).take(limit);
        let bytes_received = copy_body(&mut bounded, &mut file, url)?;

        let truncated = match mode {
            DownloadMode::Safe => {
                check_exact(url, expected_length, bytes_received, reported_length)?;
                false
            }
            DownloadMode::Unsafe => {
                bytes_received == expected_length
                    && reported_length.is_some_and(|reported| reported > expected_length)
            }
        };

        file.seek(SeekFrom::Start(0)).map_err(|err| io_error(url, &err))?;
        Ok(Download {
            file,
            report: DownloadReport {
                url: url.to_string(),
                mode,
                expected_length,
                bytes_received,
                reported_length,
                truncated,
            },
        })
    }

    /// Builds a client with the configured timeouts and routing.
    fn client(&self, transport: &TransportEnv, url: &str) -> Result<Client, DownloadError> {
        let builder = Client::builder()
            .timeout(self.config.timeout)
            .connect_timeout(self.config.connect_timeout)
            .user_agent(self.config.user_agent.clone())
            .redirect(Policy::none());
        transport
            .configure(builder, url)?
            .build()
            .map_err(|err| classify_reqwest(url, &err))
    }
}

// ============================================================================
// SECTION: Entry Points
// ============================================================================

/// Downloads `url` and requires exactly `expected_length` bytes.
///
/// # Errors
///
/// Returns [`DownloadErrorKind::LengthMismatch`] for a short or long body, or
/// another classified [`DownloadError`] for transport failures.
pub fn safe_download(url: &str, expected_length: u64) -> Result<Download, DownloadError> {
    Downloader::default().download(url, expected_length, DownloadMode::Safe)
}

/// Downloads `url` reading at most `expected_length` bytes.
///
/// # Errors
///
/// Returns a classified [`DownloadError`] for transport failures.
pub fn unsafe_download(url: &str, expected_length: u64) -> Result<Download, DownloadError> {
    Downloader::default().download(url, expected_length, DownloadMode::Unsafe)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses and validates the target URL.
fn parse_url(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url).map_err(|err| {
        DownloadError::new(DownloadErrorKind::Config, url, format!("invalid url: {err}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(DownloadError::new(
            DownloadErrorKind::Config,
            url,
            format!("unsupported scheme {other}"),
        )),
    }
}

/// Streams the bounded body into the spool file.
fn copy_body<R: Read>(reader: &mut R, file: &mut File, url: &str) -> Result<u64, DownloadError> {
    let mut chunk = [0_u8; 8192];
    let mut total: u64 = 0;
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(classify_body_io(url, &err)),
        };
        io::Write::write_all(file, &chunk[.. read]).map_err(|err| io_error(url, &err))?;
        total = total.saturating_add(read as u64);
    }
}

/// Enforces the strict length contract.
fn check_exact(
    url: &str,
    expected: u64,
    received: u64,
    reported: Option<u64>,
) -> Result<(), DownloadError> {
    if received == expected {
        return Ok(());
    }
    let announced = reported.map_or_else(String::new, |value| format!(" (Content-Length {value})"));
    let message = if received > expected {
        format!("expected {expected} bytes but body exceeded it{announced}")
    } else {
        format!("expected {expected} bytes but received {received}{announced}")
    };
    Err(DownloadError::new(DownloadErrorKind::LengthMismatch, url, message))
}

/// Builds an I/O error for spool failures.
fn io_error(url: &str, err: &io::Error) -> DownloadError {
    DownloadError::new(DownloadErrorKind::Io, url, err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::check_exact;
    use super::parse_url;
    use crate::error::DownloadErrorKind;

    #[test]
    fn exact_length_passes() {
        assert!(check_exact("u", 10, 10, Some(10)).is_ok());
    }

    #[test]
    fn long_and_short_bodies_are_mismatches() {
        for received in [9, 11] {
            let err = check_exact("u", 10, received, None).err();
            assert_eq!(err.map(|err| err.kind()), Some(DownloadErrorKind::LengthMismatch));
        }
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let err = parse_url("ftp://localhost/file").err();
        assert_eq!(err.map(|err| err.kind()), Some(DownloadErrorKind::Config));
    }
}
