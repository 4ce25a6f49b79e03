// system-tests/tests/proxy_use.rs
// ============================================================================
// Module: Proxy Use Suite
// Description: Aggregates proxy topology system tests into one binary.
// Purpose: Run the download matrix against live helper processes.
// Dependencies: suites/*, helpers
// ============================================================================

//! ## Overview
//! Aggregates proxy topology system tests into one binary.
//! Invariants:
//! - All five helpers are ready before the first scenario runs.
//! - Every scenario leaves the proxy variables as it found them.

mod helpers;

#[path = "suites/proxy_use.rs"]
mod proxy_use;
