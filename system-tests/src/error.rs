// system-tests/src/error.rs
// ============================================================================
// Module: Harness Errors
// Description: Fatal fixture-setup failures.
// Purpose: Abort a suite with enough context to diagnose the failing helper.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every [`HarnessError`] aborts the suite. Process failures carry the role,
//! port, exit status and captured stderr of the helper that failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::env_scope::EnvScopeError;
use crate::roles::ServerRole;

// ============================================================================
// SECTION: Harness Error
// ============================================================================

/// Fixture setup and teardown errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid harness configuration.
    #[error("invalid harness config: {0}")]
    Config(String),
    /// No usable base port was found.
    #[error("port allocation failed: {0}")]
    PortPlan(String),
    /// Helper process could not be spawned.
    #[error("failed to spawn {role} ({program}): {source}")]
    Spawn {
        /// Role of the helper.
        role: ServerRole,
        /// Program that was launched.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Helper exited before accepting connections.
    #[error("{role} on port {port} exited before becoming ready ({status}); stderr:\n{stderr}")]
    ExitedEarly {
        /// Role of the helper.
        role: ServerRole,
        /// Assigned port.
        port: u16,
        /// Exit status.
        status: ExitStatus,
        /// Captured stderr.
        stderr: String,
    },
    /// Helper never accepted a connection within the readiness timeout.
    #[error("{role} not ready on port {port} after {attempts} attempts; stderr:\n{stderr}")]
    NotReady {
        /// Role of the helper.
        role: ServerRole,
        /// Assigned port.
        port: u16,
        /// Probe attempts made.
        attempts: u32,
        /// Captured stderr.
        stderr: String,
    },
    /// TLS asset generation failed.
    #[error("certificate generation failed: {0}")]
    Certificates(String),
    /// Filesystem or process I/O failure.
    #[error("harness io error: {0}")]
    Io(#[from] io::Error),
    /// Environment scope misuse.
    #[error(transparent)]
    Env(#[from] EnvScopeError),
}
