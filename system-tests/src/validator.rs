// system-tests/src/validator.rs
// ============================================================================
// Module: Download Validator
// Description: Runs the fetch routine in both length modes against a target.
// Purpose: Turn fetch results into comparable outcomes for the matrix.
// Dependencies: checked-download, serde
// ============================================================================

//! ## Overview
//! The validator calls the fetch routine once in safe mode and once in unsafe
//! mode. Routing comes from the process environment at call time, so the
//! caller sets proxy variables through its [`crate::EnvScope`] first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use checked_download::DownloadConfig;
use checked_download::DownloadErrorKind;
use checked_download::DownloadMode;
use checked_download::Downloader;
use serde::Serialize;

use crate::config::SystemTestConfig;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The routine returned a file.
    Success {
        /// Bytes in the returned file.
        bytes_received: u64,
        /// The file matched the target contents byte for byte.
        content_matches: bool,
        /// Upper-bound mode stopped reading at the bound.
        truncated: bool,
    },
    /// The routine returned an error.
    Failure {
        /// Classified failure.
        kind: DownloadErrorKind,
        /// Error text.
        message: String,
    },
}

impl DownloadOutcome {
    /// Returns the failure kind, if any.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<DownloadErrorKind> {
        match self {
            Self::Success {
                ..
            } => None,
            Self::Failure {
                kind, ..
            } => Some(*kind),
        }
    }
}

/// Outcome of one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeOutcome {
    /// Length mode used.
    pub mode: DownloadMode,
    /// What happened.
    #[serde(flatten)]
    pub outcome: DownloadOutcome,
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Runs both download modes for one target.
#[derive(Debug, Clone, Default)]
pub struct DownloadValidator {
    /// Fetch routine configured with the harness timeouts.
    downloader: Downloader,
}

impl DownloadValidator {
    /// Creates a validator with the given client settings.
    #[must_use]
    pub const fn new(config: DownloadConfig) -> Self {
        Self {
            downloader: Downloader::new(config),
        }
    }

    /// Downloads `url` once per mode with `expected_len` as the length
    /// argument, comparing each file with `expected`.
    #[must_use]
    pub fn run(&self, url: &str, expected_len: u64, expected: &[u8]) -> Vec<ModeOutcome> {
        DownloadMode::ALL
            .iter()
            .map(|mode| ModeOutcome {
                mode: *mode,
                outcome: self.attempt(url, expected_len, expected, *mode),
            })
            .collect()
    }

    /// Runs a single mode.
    fn attempt(
        &self,
        url: &str,
        expected_len: u64,
        expected: &[u8],
        mode: DownloadMode,
    ) -> DownloadOutcome {
        let mut download = match self.downloader.download(url, expected_len, mode) {
            Ok(download) => download,
            Err(err) => {
                return DownloadOutcome::Failure {
                    kind: err.kind(),
                    message: err.to_string(),
                };
            }
        };
        match download.read_all() {
            Ok(body) => DownloadOutcome::Success {
                bytes_received: download.report().bytes_received,
                content_matches: body == expected,
                truncated: download.report().truncated,
            },
            Err(err) => DownloadOutcome::Failure {
                kind: DownloadErrorKind::Io,
                message: format!("failed to read downloaded file: {err}"),
            },
        }
    }
}

/// Returns fetch settings with the configured timeout applied.
#[must_use]
pub fn download_config(config: &SystemTestConfig) -> DownloadConfig {
    let mut download = DownloadConfig::default();
    if let Some(timeout) = config.fetch_timeout {
        download.timeout = timeout;
        download.connect_timeout = download.connect_timeout.min(timeout);
    }
    download
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::time::Duration;

    use checked_download::DownloadErrorKind;
    use checked_download::DownloadMode;

    use super::DownloadOutcome;
    use super::DownloadValidator;
    use super::ModeOutcome;
    use super::download_config;
    use crate::config::SystemTestConfig;
    use crate::env_scope::EnvScope;

    #[test]
    fn fetch_timeout_overrides_both_timeouts() {
        let config = SystemTestConfig {
            fetch_timeout: Some(Duration::from_secs(2)),
            ..SystemTestConfig::default()
        };
        let download = download_config(&config);
        assert_eq!(download.timeout, Duration::from_secs(2));
        assert_eq!(download.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn outcomes_serialize_with_mode_and_kind() {
        let outcome = ModeOutcome {
            mode: DownloadMode::Safe,
            outcome: DownloadOutcome::Failure {
                kind: DownloadErrorKind::Tls,
                message: "bad certificate".to_string(),
            },
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["mode"], "safe");
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["kind"], "tls");
    }

    #[test]
    fn refused_connection_fails_in_both_modes() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut scope = EnvScope::acquire();
        for key in [
            checked_download::HTTP_PROXY_VAR,
            checked_download::HTTPS_PROXY_VAR,
            checked_download::CA_BUNDLE_VAR,
        ] {
            scope.remove_scoped(key);
        }
        let validator = DownloadValidator::default();
        let outcomes = validator.run(&format!("http://127.0.0.1:{port}/missing"), 3, b"abc");
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert_eq!(outcome.outcome.failure_kind(), Some(DownloadErrorKind::Connection));
        }
    }
}
