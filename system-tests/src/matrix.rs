// system-tests/src/matrix.rs
// ============================================================================
// Module: Proxy Topology Matrix
// Description: Scenario table, per-scenario execution and evaluation.
// Purpose: Check both download modes against every proxy topology.
// Dependencies: checked-download, serde
// ============================================================================

//! ## Overview
//! A [`Scenario`] names which proxy each variable points at, which CA bundle
//! the client trusts, which origin it targets, and what must happen. The
//! runner isolates each scenario in its own [`crate::TestCase`], downloads the
//! target in both modes, and records deviations instead of panicking, so one
//! broken topology does not hide the rest.
//!
//! Expected failures are asserted by [`DownloadErrorKind`]; any other kind,
//! or a success, is a deviation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::path::Path;

use checked_download::CA_BUNDLE_VAR;
use checked_download::DownloadErrorKind;
use checked_download::DownloadMode;
use checked_download::HTTP_PROXY_VAR;
use checked_download::HTTPS_PROXY_VAR;
use serde::Serialize;

use crate::certs::CertificatePaths;
use crate::error::HarnessError;
use crate::events::HarnessEvent;
use crate::fixture::ProxyEndpoints;
use crate::fixture::ProxySuite;
use crate::fixture::TestCase;
use crate::validator::DownloadOutcome;
use crate::validator::DownloadValidator;
use crate::validator::ModeOutcome;

// ============================================================================
// SECTION: Scenario Model
// ============================================================================

/// Proxy a variable points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyChoice {
    /// Variable removed.
    Unset,
    /// Forwarding proxy without `CONNECT`.
    Dumb,
    /// Forwarding proxy with `CONNECT`.
    Connect,
    /// TLS-intercepting proxy.
    Intercept,
}

impl ProxyChoice {
    /// Returns the proxy URL, or `None` when the variable stays unset.
    #[must_use]
    pub fn url(self, endpoints: &ProxyEndpoints) -> Option<&str> {
        match self {
            Self::Unset => None,
            Self::Dumb => Some(&endpoints.dumb),
            Self::Connect => Some(&endpoints.connect),
            Self::Intercept => Some(&endpoints.intercept),
        }
    }
}

/// CA bundle the client trusts in addition to the built-in roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaChoice {
    /// No extra bundle.
    Unset,
    /// Origin authority (`ssl_cert.crt`).
    Origin,
    /// Interceptor authority (`proxy_ca.crt`).
    Proxy,
}

impl CaChoice {
    /// Returns the bundle path, or `None` when the variable stays unset.
    #[must_use]
    pub fn path(self, certs: &CertificatePaths) -> Option<&Path> {
        match self {
            Self::Unset => None,
            Self::Origin => Some(&certs.origin_ca),
            Self::Proxy => Some(&certs.proxy_ca),
        }
    }
}

/// Origin a scenario downloads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Plain HTTP origin.
    HttpOrigin,
    /// HTTPS origin.
    HttpsOrigin,
}

/// Required result for both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "expect", content = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// Exact target bytes in both modes.
    Success,
    /// This failure kind in both modes.
    Failure(DownloadErrorKind),
}

/// One proxy topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scenario {
    /// Stable scenario name.
    pub name: &'static str,
    /// `HTTP_PROXY` setting.
    pub http_proxy: ProxyChoice,
    /// `HTTPS_PROXY` setting.
    pub https_proxy: ProxyChoice,
    /// `REQUESTS_CA_BUNDLE` setting.
    pub ca_bundle: CaChoice,
    /// Download target.
    pub target: Target,
    /// Required result.
    pub expect: Expectation,
}

/// Returns the proxy topology matrix in execution order.
#[must_use]
pub const fn proxy_matrix() -> [Scenario; 8] {
    [
        Scenario {
            name: "baseline_no_proxy",
            http_proxy: ProxyChoice::Unset,
            https_proxy: ProxyChoice::Unset,
            ca_bundle: CaChoice::Unset,
            target: Target::HttpOrigin,
            expect: Expectation::Success,
        },
        Scenario {
            name: "http_via_dumb_proxy",
            http_proxy: ProxyChoice::Dumb,
            https_proxy: ProxyChoice::Unset,
            ca_bundle: CaChoice::Unset,
            target: Target::HttpOrigin,
            expect: Expectation::Success,
        },
        Scenario {
            name: "https_via_dumb_proxy",
            http_proxy: ProxyChoice::Unset,
            https_proxy: ProxyChoice::Dumb,
            ca_bundle: CaChoice::Origin,
            target: Target::HttpsOrigin,
            expect: Expectation::Failure(DownloadErrorKind::Connection),
        },
        Scenario {
            name: "http_via_connect_proxy",
            http_proxy: ProxyChoice::Connect,
            https_proxy: ProxyChoice::Unset,
            ca_bundle: CaChoice::Unset,
            target: Target::HttpOrigin,
            expect: Expectation::Success,
        },
        Scenario {
            name: "https_via_connect_proxy",
            http_proxy: ProxyChoice::Connect,
            https_proxy: ProxyChoice::Connect,
            ca_bundle: CaChoice::Origin,
            target: Target::HttpsOrigin,
            expect: Expectation::Success,
        },
        Scenario {
            name: "http_via_intercept_proxy",
            http_proxy: ProxyChoice::Intercept,
            https_proxy: ProxyChoice::Intercept,
            ca_bundle: CaChoice::Proxy,
            target: Target::HttpOrigin,
            expect: Expectation::Success,
        },
        Scenario {
            name: "https_via_intercept_proxy",
            http_proxy: ProxyChoice::Intercept,
            https_proxy: ProxyChoice::Intercept,
            ca_bundle: CaChoice::Proxy,
            target: Target::HttpsOrigin,
            expect: Expectation::Success,
        },
        Scenario {
            name: "https_via_intercept_proxy_wrong_ca",
            http_proxy: ProxyChoice::Intercept,
            https_proxy: ProxyChoice::Intercept,
            ca_bundle: CaChoice::Origin,
            target: Target::HttpsOrigin,
            expect: Expectation::Failure(DownloadErrorKind::Tls),
        },
    ]
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// What one scenario did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Required result.
    pub expect: Expectation,
    /// Downloaded URL.
    pub url: String,
    /// `HTTP_PROXY` value used, if set.
    pub http_proxy: Option<String>,
    /// `HTTPS_PROXY` value used, if set.
    pub https_proxy: Option<String>,
    /// `REQUESTS_CA_BUNDLE` value used, if set.
    pub ca_bundle: Option<String>,
    /// Expected length passed to both modes.
    pub expected_length: u64,
    /// Per-mode outcomes.
    pub outcomes: Vec<ModeOutcome>,
    /// Deviations from the expectation; empty when the scenario passed.
    pub problems: Vec<String>,
}

impl ScenarioReport {
    /// Returns true when the scenario met its expectation.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }

    /// Renders the scenario with its routing context and deviations.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{}: url={} http_proxy={} https_proxy={} ca_bundle={} expected_length={}",
            self.name,
            self.url,
            self.http_proxy.as_deref().unwrap_or("<unset>"),
            self.https_proxy.as_deref().unwrap_or("<unset>"),
            self.ca_bundle.as_deref().unwrap_or("<unset>"),
            self.expected_length
        );
        for problem in &self.problems {
            let _ = write!(text, "\n  - {problem}");
        }
        text
    }
}

/// Reports for a whole matrix run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatrixReport {
    /// Scenario reports in execution order.
    pub scenarios: Vec<ScenarioReport>,
}

impl MatrixReport {
    /// Returns the scenarios that deviated.
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioReport> {
        self.scenarios.iter().filter(|report| !report.passed()).collect()
    }

    /// Returns true when every scenario passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// Renders every failing scenario.
    #[must_use]
    pub fn describe_failures(&self) -> String {
        self.failures().iter().map(|report| report.describe()).collect::<Vec<_>>().join("\n")
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Compares per-mode outcomes with the expectation; returns the deviations.
#[must_use]
pub fn evaluate(expect: Expectation, expected_length: u64, outcomes: &[ModeOutcome]) -> Vec<String> {
    let mut problems = Vec::new();
    for mode in DownloadMode::ALL {
        if !outcomes.iter().any(|outcome| outcome.mode == mode) {
            problems.push(format!("{mode}: no download attempted"));
        }
    }
    for ModeOutcome {
        mode,
        outcome,
    } in outcomes
    {
        match (expect, outcome) {
            (
                Expectation::Success,
                DownloadOutcome::Success {
                    bytes_received,
                    content_matches,
                    truncated,
                },
            ) => {
                if *bytes_received != expected_length {
                    problems.push(format!(
                        "{mode}: received {bytes_received} bytes, expected {expected_length}"
                    ));
                } else if !content_matches {
                    problems.push(format!("{mode}: downloaded bytes differ from the target file"));
                }
                if *truncated {
                    problems.push(format!("{mode}: body was longer than the expected length"));
                }
            }
            (
                Expectation::Success,
                DownloadOutcome::Failure {
                    kind,
                    message,
                },
            ) => {
                problems.push(format!("{mode}: expected success, got {kind} failure: {message}"));
            }
            (
                Expectation::Failure(wanted),
                DownloadOutcome::Success {
                    bytes_received, ..
                },
            ) => {
                problems.push(format!(
                    "{mode}: expected {wanted} failure, download succeeded with {bytes_received} bytes"
                ));
            }
            (
                Expectation::Failure(wanted),
                DownloadOutcome::Failure {
                    kind,
                    message,
                },
            ) => {
                if kind != &wanted {
                    problems.push(format!(
                        "{mode}: expected {wanted} failure, got {kind} failure: {message}"
                    ));
                }
            }
        }
    }
    problems
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Points `key` at `value`, or removes it.
fn apply(case: &mut TestCase, key: &str, value: Option<&str>) {
    match value {
        Some(value) => case.set_env(key, value),
        None => case.remove_env(key),
    }
}

/// Runs one scenario in its own case.
///
/// # Errors
///
/// Returns [`HarnessError`] when the case cannot be set up; download
/// deviations are reported, not returned.
pub fn run_scenario(
    suite: &ProxySuite,
    validator: &DownloadValidator,
    scenario: &Scenario,
) -> Result<ScenarioReport, HarnessError> {
    let mut case = suite.begin_case(scenario.name)?;
    let http_proxy = scenario.http_proxy.url(suite.endpoints()).map(str::to_string);
    let https_proxy = scenario.https_proxy.url(suite.endpoints()).map(str::to_string);
    let ca_bundle =
        scenario.ca_bundle.path(suite.certificates()).map(|path| path.display().to_string());
    apply(&mut case, HTTP_PROXY_VAR, http_proxy.as_deref());
    apply(&mut case, HTTPS_PROXY_VAR, https_proxy.as_deref());
    apply(&mut case, CA_BUNDLE_VAR, ca_bundle.as_deref());

    let url = match scenario.target {
        Target::HttpOrigin => case.http_url(),
        Target::HttpsOrigin => case.https_url(),
    }
    .to_string();
    let expected_length = case.expected_len();
    let contents = case.target().contents()?;
    let outcomes = validator.run(&url, expected_length, &contents);
    case.finish();

    let problems = evaluate(scenario.expect, expected_length, &outcomes);
    let report = ScenarioReport {
        name: scenario.name.to_string(),
        expect: scenario.expect,
        url,
        http_proxy,
        https_proxy,
        ca_bundle,
        expected_length,
        outcomes,
        problems,
    };
    suite.record_event(
        &HarnessEvent::new(if report.passed() { "scenario_passed" } else { "scenario_failed" })
            .detail(report.name.clone()),
    );
    Ok(report)
}

/// Runs `scenarios` in order, each in its own case.
///
/// # Errors
///
/// Returns [`HarnessError`] when a case cannot be set up.
pub fn run_matrix(
    suite: &ProxySuite,
    validator: &DownloadValidator,
    scenarios: &[Scenario],
) -> Result<MatrixReport, HarnessError> {
    let mut report = MatrixReport::default();
    for scenario in scenarios {
        report.scenarios.push(run_scenario(suite, validator, scenario)?);
    }
    Ok(report)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::collections::BTreeSet;

    use checked_download::DownloadErrorKind;
    use checked_download::DownloadMode;

    use super::CaChoice;
    use super::Expectation;
    use super::ProxyChoice;
    use super::Target;
    use super::evaluate;
    use super::proxy_matrix;
    use crate::validator::DownloadOutcome;
    use crate::validator::ModeOutcome;

    /// Builds a success outcome.
    fn success(mode: DownloadMode, bytes: u64, matches: bool) -> ModeOutcome {
        ModeOutcome {
            mode,
            outcome: DownloadOutcome::Success {
                bytes_received: bytes,
                content_matches: matches,
                truncated: false,
            },
        }
    }

    /// Builds a failure outcome.
    fn failure(mode: DownloadMode, kind: DownloadErrorKind) -> ModeOutcome {
        ModeOutcome {
            mode,
            outcome: DownloadOutcome::Failure {
                kind,
                message: "boom".to_string(),
            },
        }
    }

    #[test]
    fn matrix_names_are_unique() {
        let names: BTreeSet<&str> = proxy_matrix().iter().map(|scenario| scenario.name).collect();
        assert_eq!(names.len(), proxy_matrix().len());
    }

    #[test]
    fn negative_scenarios_name_specific_kinds() {
        let matrix = proxy_matrix();
        let dumb = matrix.iter().find(|scenario| scenario.name == "https_via_dumb_proxy").unwrap();
        assert_eq!(dumb.https_proxy, ProxyChoice::Dumb);
        assert_eq!(dumb.target, Target::HttpsOrigin);
        assert_eq!(dumb.expect, Expectation::Failure(DownloadErrorKind::Connection));

        let wrong_ca = matrix
            .iter()
            .find(|scenario| scenario.name == "https_via_intercept_proxy_wrong_ca")
            .unwrap();
        assert_eq!(wrong_ca.ca_bundle, CaChoice::Origin);
        assert_eq!(wrong_ca.expect, Expectation::Failure(DownloadErrorKind::Tls));
    }

    #[test]
    fn success_requires_exact_bytes_in_both_modes() {
        let ok = [success(DownloadMode::Safe, 10, true), success(DownloadMode::Unsafe, 10, true)];
        assert!(evaluate(Expectation::Success, 10, &ok).is_empty());

        let short = [success(DownloadMode::Safe, 10, true), success(DownloadMode::Unsafe, 7, false)];
        let problems = evaluate(Expectation::Success, 10, &short);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("unsafe:"));

        let mismatch = [success(DownloadMode::Safe, 10, false), success(DownloadMode::Unsafe, 10, true)];
        assert_eq!(evaluate(Expectation::Success, 10, &mismatch).len(), 1);
    }

    #[test]
    fn success_rejects_any_failure() {
        let outcomes =
            [success(DownloadMode::Safe, 10, true), failure(DownloadMode::Unsafe, DownloadErrorKind::Timeout)];
        let problems = evaluate(Expectation::Success, 10, &outcomes);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("timeout"));
    }

    #[test]
    fn expected_failure_requires_the_named_kind() {
        let expect = Expectation::Failure(DownloadErrorKind::Connection);
        let right = [
            failure(DownloadMode::Safe, DownloadErrorKind::Connection),
            failure(DownloadMode::Unsafe, DownloadErrorKind::Connection),
        ];
        assert!(evaluate(expect, 10, &right).is_empty());

        let wrong = [
            failure(DownloadMode::Safe, DownloadErrorKind::LengthMismatch),
            failure(DownloadMode::Unsafe, DownloadErrorKind::Connection),
        ];
        assert_eq!(evaluate(expect, 10, &wrong).len(), 1);

        let succeeded = [success(DownloadMode::Safe, 10, true), success(DownloadMode::Unsafe, 10, true)];
        assert_eq!(evaluate(expect, 10, &succeeded).len(), 2);
    }

    #[test]
    fn missing_mode_is_a_problem() {
        let outcomes = [success(DownloadMode::Safe, 10, true)];
        let problems = evaluate(Expectation::Success, 10, &outcomes);
        assert_eq!(problems, vec!["unsafe: no download attempted".to_string()]);
    }
}
