// crates/proxy-fixtures/src/log.rs
// ============================================================================
// Module: Fixture Event Log
// Description: JSON-lines events written to stderr by fixture servers.
// Purpose: Give the supervising harness machine-readable diagnostics.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Fixture servers run as child processes whose stderr is captured by the
//! harness. Each event is a single JSON object on its own line so captured
//! output can be attached to failure reports verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Fixture Events
// ============================================================================

/// Structured fixture event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureEvent {
    /// Event name.
    pub event: &'static str,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// Server label (`origin_http`, `dumb_proxy`, ...).
    pub server: &'static str,
    /// Request method, when the event concerns a request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request target, when the event concerns a request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Response status, when one was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FixtureEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(server: &'static str, event: &'static str) -> Self {
        Self {
            event,
            timestamp_ms: now_ms(),
            server,
            method: None,
            target: None,
            status: None,
            detail: None,
        }
    }

    /// Attaches the request method and target.
    #[must_use]
    pub fn request(mut self, method: impl Into<String>, target: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.target = Some(target.into());
        self
    }

    /// Attaches the response status.
    #[must_use]
    pub const fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches free-form detail.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Writes the event to stderr as one JSON line.
    pub fn emit(&self) {
        if let Ok(payload) = serde_json::to_string(self) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{payload}");
        }
    }
}

/// Returns milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |duration| duration.as_millis())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::FixtureEvent;

    #[test]
    fn absent_fields_are_omitted() {
        let event = FixtureEvent::new("dumb_proxy", "connect_rejected")
            .request("CONNECT", "localhost:443")
            .status(501);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["server"], "dumb_proxy");
        assert_eq!(value["status"], 501);
        assert!(value.get("detail").is_none());
    }
}
