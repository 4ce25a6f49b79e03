// system-tests/tests/suites/proxy_use.rs
// ============================================================================
// Module: Proxy Use Tests
// Description: Length-checked downloads through every proxy topology.
// Purpose: Validate routing, trust and teardown against live helpers.
// Dependencies: system-tests helpers, checked-download
// ============================================================================

//! ## Overview
//! Starts the five helper processes once per test and drives the download
//! matrix through them.
//! Invariants:
//! - Expected failures are checked by kind, never as "any error".
//! - Proxy variables are identical before and after the matrix.
//! - Teardown stops each helper exactly once.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;

use checked_download::CA_BUNDLE_VAR;
use checked_download::HTTP_PROXY_VAR;
use checked_download::HTTPS_PROXY_VAR;
use system_tests::EnvScope;
use system_tests::ServerRole;
use system_tests::matrix::proxy_matrix;
use system_tests::matrix::run_matrix;
use system_tests::validator::DownloadValidator;
use system_tests::validator::download_config;

use crate::helpers::artifacts::RunReporter;
use crate::helpers::suite::StartedSuite;
use crate::helpers::suite::start_suite;

/// Variables the matrix mutates.
const PROXY_VARS: [&str; 3] = [HTTP_PROXY_VAR, HTTPS_PROXY_VAR, CA_BUNDLE_VAR];

#[test]
fn proxy_topology_matrix() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = RunReporter::new("proxy_topology_matrix")?;
    let before = proxy_env();
    let StartedSuite {
        suite,
        events,
        config,
    } = start_suite(reporter.artifacts())?;

    let scenarios = proxy_matrix();
    let validator = DownloadValidator::new(download_config(&config));
    let report = run_matrix(&suite, &validator, &scenarios)?;
    reporter.artifacts().write_json("matrix.json", &report)?;
    reporter.record_matrix(&report);
    require(proxy_env() == before, "proxy variables changed across the matrix")?;

    let stop = suite.shutdown();
    reporter.record_teardown(&stop);
    require(stop.killed.len() == 5, "teardown killed every helper")?;
    require(stop.errors.is_empty(), format!("teardown errors: {}", stop.errors.join("; ")))?;
    let scenario_events = events.named("scenario_passed").len() + events.named("scenario_failed").len();
    require(scenario_events == report.scenarios.len(), "one event per scenario")?;

    if !report.passed() {
        let failures = report.describe_failures();
        reporter.note(failures.clone());
        reporter.finish("fail")?;
        return Err(format!("proxy matrix deviations:\n{failures}").into());
    }
    reporter.finish("pass")?;

    let summary: serde_json::Value =
        serde_json::from_slice(&fs::read(reporter.artifacts().root().join("summary.json"))?)?;
    require(
        summary["scenarios_passed"].as_u64() == u64::try_from(scenarios.len()).ok(),
        "summary counts every scenario as passed",
    )?;
    require(summary["scenarios_failed"].as_u64() == Some(0), "summary has no failed scenario")?;
    require(summary["teardown"]["killed"].as_u64() == Some(5), "summary records teardown")?;
    let first_modes = &summary["scenarios"][0]["modes"];
    require(
        first_modes[0] == "safe=success" && first_modes[1] == "unsafe=success",
        "baseline modes are recorded per mode",
    )?;
    Ok(())
}

#[test]
fn suite_teardown_stops_each_helper_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = RunReporter::new("suite_teardown_stops_each_helper_once")?;
    let StartedSuite {
        mut suite,
        events,
        ..
    } = start_suite(reporter.artifacts())?;

    let processes = suite.supervisor().processes();
    let roles: BTreeSet<ServerRole> = processes.iter().map(|process| process.role()).collect();
    let ports: BTreeSet<u16> = processes.iter().map(|process| process.port()).collect();
    require(roles.len() == 5, "one process per role")?;
    require(ports.len() == 5, "ports are unique")?;
    for process in processes {
        require(
            process.port() == suite.ports().port(process.role()),
            format!("{} listens on its planned port", process.role()),
        )?;
    }
    require(events.named("ready").len() == 5, "every helper reported ready")?;

    let first = suite.stop();
    reporter.record_teardown(&first);
    require(first.killed.len() == 5, format!("first stop killed {} helpers", first.killed.len()))?;
    require(first.errors.is_empty(), format!("stop errors: {}", first.errors.join("; ")))?;
    let second = suite.stop();
    require(second.is_empty(), "second stop had nothing to do")?;
    require(events.named("killed").len() == 5, "each helper killed exactly once")?;
    drop(suite);
    require(events.named("killed").len() == 5, "drop after stop kills nothing")?;

    reporter.note("five helpers on five unique ports; teardown is idempotent");
    reporter.finish("pass")?;
    Ok(())
}

/// Reads the proxy variables under the environment lock.
fn proxy_env() -> Vec<Option<OsString>> {
    let _scope = EnvScope::acquire();
    PROXY_VARS.iter().map(std::env::var_os).collect()
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), Box<dyn std::error::Error>> {
    if condition { Ok(()) } else { Err(message.into().into()) }
}
