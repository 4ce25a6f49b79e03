// system-tests/src/readiness.rs
// ============================================================================
// Module: Readiness Probes
// Description: TCP connect probes for freshly spawned helper servers.
// Purpose: Ensure helpers are listening without arbitrary sleeps.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A helper is ready once a TCP connect to its loopback port succeeds.
//! [`wait_for_port`] retries at a fixed interval until the policy timeout
//! elapses, and stops early when the caller reports the process has exited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::process::ExitStatus;
use std::thread;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Readiness probing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Total time allowed for a helper to start accepting connections.
    pub timeout: Duration,
    /// Delay between probes.
    pub interval: Duration,
    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(50),
            connect_timeout: Duration::from_millis(250),
        }
    }
}

impl ReadinessPolicy {
    /// Returns the default policy with a different overall timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

// ============================================================================
// SECTION: Probing
// ============================================================================

/// Why a helper never became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessFailure {
    /// The process exited while being probed.
    Exited {
        /// Exit status reported by the OS.
        status: ExitStatus,
        /// Probes made before the exit was noticed.
        attempts: u32,
    },
    /// No probe succeeded before the timeout.
    TimedOut {
        /// Probes made.
        attempts: u32,
    },
}

/// Returns true when a TCP connect to the loopback `port` succeeds.
#[must_use]
pub fn probe_port(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

/// Polls `port` until it accepts a connection.
///
/// `check_exit` is consulted before every probe and returns the exit status
/// once the process behind the port has died.
///
/// # Errors
///
/// Returns [`ReadinessFailure`] when the process exits or the timeout
/// elapses first.
pub fn wait_for_port<F>(
    port: u16,
    policy: &ReadinessPolicy,
    mut check_exit: F,
) -> Result<u32, ReadinessFailure>
where
    F: FnMut() -> Option<ExitStatus>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        if let Some(status) = check_exit() {
            return Err(ReadinessFailure::Exited {
                status,
                attempts,
            });
        }
        attempts = attempts.saturating_add(1);
        if probe_port(port, policy.connect_timeout) {
            return Ok(attempts);
        }
        if start.elapsed() >= policy.timeout {
            return Err(ReadinessFailure::TimedOut {
                attempts,
            });
        }
        thread::sleep(policy.interval);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
