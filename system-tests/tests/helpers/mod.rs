// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for proxy topology system-tests.
// Purpose: Provide suite startup and artifact utilities.
// Dependencies: system-tests, serde_jcs
// ============================================================================

//! ## Overview
//! Shared helpers for proxy topology system-tests.
//! - [`artifacts`]: per-test run roots and summaries written even on panic.
//! - [`suite`]: launches a [`system_tests::ProxySuite`] from the harness
//!   configuration with the fixture binaries of this crate.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod artifacts;
pub mod suite;
