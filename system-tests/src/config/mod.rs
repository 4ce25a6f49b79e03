// system-tests/src/config/mod.rs
// ============================================================================
// Module: Proxy Harness Configuration
// Description: Centralized configuration for the proxy topology harness.
// Purpose: Provide typed access to harness environment settings and defaults.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Harness configuration is read from `PROXY_HARNESS_*` environment variables
//! and mapped into a small typed structure shared by the fixture lifecycle and
//! the integration suites.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod env;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod env_tests;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use env::SystemTestConfig;
pub use env::SystemTestEnv;
pub use env::parse_port_range;
pub use env::read_env_strict;
