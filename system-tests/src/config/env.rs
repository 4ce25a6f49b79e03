// system-tests/src/config/env.rs
// ============================================================================
// Module: Proxy Harness Environment
// Description: Environment-backed configuration for the proxy harness.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8 fails closed, and so do empty values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys for harness configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTestEnv {
    /// Optional artifact root override.
    RunRoot,
    /// Optional base-port range (`START-END`).
    PortRange,
    /// Optional helper readiness timeout in seconds (positive integer).
    ReadyTimeoutSeconds,
    /// Optional per-download timeout in seconds (positive integer).
    FetchTimeoutSeconds,
    /// Keep the served directory after teardown (`true`/`false` or `1`/`0`).
    KeepWorkdir,
}

impl SystemTestEnv {
    /// All configuration keys.
    pub const ALL: [Self; 5] = [
        Self::RunRoot,
        Self::PortRange,
        Self::ReadyTimeoutSeconds,
        Self::FetchTimeoutSeconds,
        Self::KeepWorkdir,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunRoot => "PROXY_HARNESS_RUN_ROOT",
            Self::PortRange => "PROXY_HARNESS_PORT_RANGE",
            Self::ReadyTimeoutSeconds => "PROXY_HARNESS_READY_TIMEOUT_SEC",
            Self::FetchTimeoutSeconds => "PROXY_HARNESS_FETCH_TIMEOUT_SEC",
            Self::KeepWorkdir => "PROXY_HARNESS_KEEP_WORKDIR",
        }
    }
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Typed harness configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemTestConfig {
    /// Optional artifact root override.
    pub run_root: Option<PathBuf>,
    /// Optional base-port range override.
    pub port_range: Option<RangeInclusive<u16>>,
    /// Optional readiness timeout override.
    pub ready_timeout: Option<Duration>,
    /// Optional per-download timeout override.
    pub fetch_timeout: Option<Duration>,
    /// Keep the served directory after teardown.
    pub keep_workdir: bool,
}

impl SystemTestConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when an environment value is not valid UTF-8, is empty,
    /// or fails validation (for example, an inverted port range or a zero
    /// timeout).
    pub fn load() -> Result<Self, String> {
        let run_root = read_env_nonempty(SystemTestEnv::RunRoot.as_str())?.map(PathBuf::from);
        let port_range = read_env_nonempty(SystemTestEnv::PortRange.as_str())?
            .map(|value| parse_port_range(SystemTestEnv::PortRange.as_str(), &value))
            .transpose()?;
        let ready_timeout = read_env_nonempty(SystemTestEnv::ReadyTimeoutSeconds.as_str())?
            .map(|value| parse_timeout_seconds(SystemTestEnv::ReadyTimeoutSeconds.as_str(), &value))
            .transpose()?;
        let fetch_timeout = read_env_nonempty(SystemTestEnv::FetchTimeoutSeconds.as_str())?
            .map(|value| parse_timeout_seconds(SystemTestEnv::FetchTimeoutSeconds.as_str(), &value))
            .transpose()?;
        let keep_workdir = parse_bool_env(
            SystemTestEnv::KeepWorkdir.as_str(),
            read_env_nonempty(SystemTestEnv::KeepWorkdir.as_str())?,
        )?;
        Ok(Self {
            run_root,
            port_range,
            ready_timeout,
            fetch_timeout,
            keep_workdir,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads an environment variable and rejects empty values.
///
/// # Errors
///
/// Returns an error when the variable is set but empty or whitespace.
fn read_env_nonempty(name: &str) -> Result<Option<String>, String> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

/// Parses a `START-END` port range.
///
/// # Errors
///
/// Returns an error when either bound is not a port number, the range is
/// inverted, or the start is zero.
pub fn parse_port_range(name: &str, raw: &str) -> Result<RangeInclusive<u16>, String> {
    let invalid = || format!("{name} must look like START-END with ports in 1..=65535");
    let (start, end) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let start: u16 = start.trim().parse().map_err(|_| invalid())?;
    let end: u16 = end.trim().parse().map_err(|_| invalid())?;
    if start == 0 {
        return Err(invalid());
    }
    if start > end {
        return Err(format!("{name} start {start} is greater than end {end}"));
    }
    Ok(start ..= end)
}

/// Parses a positive timeout value from an environment variable string.
///
/// # Errors
///
/// Returns an error when the value is missing, non-numeric, or zero.
fn parse_timeout_seconds(name: &str, raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(format!("{name} must be a positive integer number of seconds"));
    }
    let secs: u64 = trimmed
        .parse()
        .map_err(|_| format!("{name} must be a positive integer number of seconds"))?;
    if secs == 0 {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// Parses a boolean environment variable; unset means `false`.
///
/// # Errors
///
/// Returns an error when the value is not a recognized boolean literal.
fn parse_bool_env(name: &str, raw: Option<String>) -> Result<bool, String> {
    let Some(value) = raw else {
        return Ok(false);
    };
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(format!("{name} must be 1, 0, true, or false"))
}
