// crates/proxy-fixtures/src/error.rs
// ============================================================================
// Module: Fixture Errors
// Description: Startup failures for fixture servers.
// Purpose: Give fixture binaries a single error type to report before exiting.
// Dependencies: thiserror
// ============================================================================

//! Error type shared by the origin and proxy servers.

use std::io;

use thiserror::Error;

/// Fixture server startup errors.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Listener could not bind the loopback port.
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
    /// Certificate or key material could not be loaded.
    #[error("tls setup failed: {0}")]
    Tls(String),
    /// Upstream HTTP client could not be built.
    #[error("http client setup failed: {0}")]
    Client(String),
    /// Invalid fixture configuration.
    #[error("invalid fixture configuration: {0}")]
    Config(String),
    /// Runtime or filesystem error.
    #[error("fixture io error: {0}")]
    Io(#[from] io::Error),
}
