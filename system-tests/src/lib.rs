// system-tests/src/lib.rs
// ============================================================================
// Module: Proxy Download Harness Library
// Description: Fixture orchestration for proxy topology download tests.
// Purpose: Start helper servers, isolate environment state, run the matrix.
// Dependencies: checked-download, rand, rcgen, serde, tempfile, thiserror
// ============================================================================

//! ## Overview
//! This crate hosts the harness behind the proxy topology suites in
//! `system-tests/tests`. Components, leaves first:
//! - [`ports`]: random base port and the five role ports derived from it.
//! - [`supervisor`]: spawns, probes and kills the five helper processes.
//! - [`env_scope`]: the only place that mutates the process environment.
//! - [`fixture`]: suite-level and per-case setup and teardown.
//! - [`validator`]: runs both download modes for one target.
//! - [`matrix`]: scenario table, evaluation and reports.
//!
//! The helper servers are the `fixture_origin` and `fixture_proxy` binaries
//! of this crate, built on the `proxy-fixtures` library.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod certs;
pub mod config;
pub mod env_scope;
pub mod error;
pub mod events;
pub mod fixture;
pub mod matrix;
pub mod ports;
pub mod readiness;
pub mod roles;
pub mod supervisor;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use env_scope::EnvScope;
pub use env_scope::EnvScopeError;
pub use error::HarnessError;
pub use fixture::FixturePrograms;
pub use fixture::ProxySuite;
pub use fixture::SuiteOptions;
pub use fixture::TestCase;
pub use roles::ServerRole;
