// system-tests/src/events.rs
// ============================================================================
// Module: Harness Events
// Description: Structured lifecycle events for helper processes and cases.
// Purpose: Record supervisor transitions as JSON lines without a log stack.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every supervisor transition (spawned, ready, killed, already exited) and
//! every matrix scenario produces one [`HarnessEvent`]. Events go to a
//! [`HarnessEventSink`]; the stderr and file sinks write one JSON object per
//! line, the memory sink keeps events for assertions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::roles::ServerRole;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Harness lifecycle event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Helper role when the event concerns a process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ServerRole>,
    /// Process id when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Assigned port when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HarnessEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            timestamp_ms: now_ms(),
            role: None,
            pid: None,
            port: None,
            detail: None,
        }
    }

    /// Creates an event about a helper process.
    #[must_use]
    pub fn process(event: &'static str, role: ServerRole, port: u16, pid: u32) -> Self {
        let mut payload = Self::new(event);
        payload.role = Some(role);
        payload.port = Some(port);
        payload.pid = Some(pid);
        payload
    }

    /// Attaches free-form detail.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Returns milliseconds since the Unix epoch, or zero if the clock is skewed.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis()).unwrap_or(0)
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Destination for harness events.
pub trait HarnessEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &HarnessEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Event sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl HarnessEventSink for StderrEventSink {
    fn record(&self, event: &HarnessEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Event sink that logs JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl HarnessEventSink for FileEventSink {
    fn record(&self, event: &HarnessEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Event sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryEventSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<HarnessEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the recorded events with the given name.
    #[must_use]
    pub fn named(&self, event: &str) -> Vec<HarnessEvent> {
        self.events().into_iter().filter(|entry| entry.event == event).collect()
    }
}

impl HarnessEventSink for MemoryEventSink {
    fn record(&self, event: &HarnessEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

/// Sink that forwards every event to several sinks.
pub struct FanoutEventSink {
    /// Downstream sinks.
    sinks: Vec<Arc<dyn HarnessEventSink>>,
}

impl FanoutEventSink {
    /// Creates a fan-out over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn HarnessEventSink>>) -> Self {
        Self {
            sinks,
        }
    }
}

impl HarnessEventSink for FanoutEventSink {
    fn record(&self, event: &HarnessEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
