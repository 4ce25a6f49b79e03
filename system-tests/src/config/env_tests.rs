// system-tests/src/config/env_tests.rs
// ============================================================================
// Module: Proxy Harness Env Unit Tests
// Description: Unit coverage for strict environment parsing in the harness.
// Purpose: Ensure configuration parsing fails closed on invalid inputs.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Unit coverage for strict environment parsing in the harness.
//! Invariants:
//! - Environment parsing rejects invalid or empty values.
//! - Tests mutate the environment only through an [`EnvScope`], which
//!   restores every touched key when dropped.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Test-only assertions favor direct unwrap/expect for clarity."
)]

use std::time::Duration;

use super::SystemTestConfig;
use super::SystemTestEnv;
use super::parse_port_range;
use crate::env_scope::EnvScope;

/// Acquires a scope with every harness variable removed.
fn clean_scope() -> EnvScope {
    let mut scope = EnvScope::acquire();
    for key in SystemTestEnv::ALL {
        scope.remove_scoped(key.as_str());
    }
    scope
}

#[test]
fn defaults_apply_when_unset() {
    let _scope = clean_scope();
    let config = SystemTestConfig::load().expect("config should load");
    assert_eq!(config, SystemTestConfig::default());
}

#[test]
fn timeout_rejects_invalid_values() {
    let mut scope = clean_scope();
    let key = SystemTestEnv::ReadyTimeoutSeconds.as_str();

    scope.set_scoped(key, "0");
    assert!(SystemTestConfig::load().is_err());

    scope.set_scoped(key, "not-a-number");
    assert!(SystemTestConfig::load().is_err());

    scope.set_scoped(key, "   ");
    assert!(SystemTestConfig::load().is_err());
}

#[test]
fn timeouts_accept_positive_values() {
    let mut scope = clean_scope();
    scope.set_scoped(SystemTestEnv::ReadyTimeoutSeconds.as_str(), "5");
    scope.set_scoped(SystemTestEnv::FetchTimeoutSeconds.as_str(), "12");
    let config = SystemTestConfig::load().expect("config should load");
    assert_eq!(config.ready_timeout, Some(Duration::from_secs(5)));
    assert_eq!(config.fetch_timeout, Some(Duration::from_secs(12)));
}

#[test]
fn port_range_parses_bounds() {
    let mut scope = clean_scope();
    scope.set_scoped(SystemTestEnv::PortRange.as_str(), "31000-31999");
    let config = SystemTestConfig::load().expect("config should load");
    assert_eq!(config.port_range, Some(31000 ..= 31999));
}

#[test]
fn port_range_rejects_malformed_values() {
    let name = SystemTestEnv::PortRange.as_str();
    assert!(parse_port_range(name, "31000").is_err());
    assert!(parse_port_range(name, "0-100").is_err());
    assert!(parse_port_range(name, "40000-30000").is_err());
    assert!(parse_port_range(name, "30000-70000").is_err());
    assert_eq!(parse_port_range(name, " 30000 - 30010 ").unwrap(), 30000 ..= 30010);
}

#[test]
fn keep_workdir_parses_bool_values() {
    let mut scope = clean_scope();
    let key = SystemTestEnv::KeepWorkdir.as_str();

    scope.set_scoped(key, "1");
    assert!(SystemTestConfig::load().expect("config should load").keep_workdir);

    scope.set_scoped(key, "false");
    assert!(!SystemTestConfig::load().expect("config should load").keep_workdir);

    scope.set_scoped(key, "maybe");
    assert!(SystemTestConfig::load().is_err());
}

#[test]
fn empty_values_fail_closed() {
    let mut scope = clean_scope();
    scope.set_scoped(SystemTestEnv::RunRoot.as_str(), "");
    assert!(SystemTestConfig::load().is_err());
}
