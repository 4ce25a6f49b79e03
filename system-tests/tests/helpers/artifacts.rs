// system-tests/tests/helpers/artifacts.rs
// ============================================================================
// Module: Run Artifacts
// Description: Per-test run roots and proxy run summaries.
// Purpose: Leave a scenario-by-scenario record of every suite run on disk.
// Dependencies: system-tests, checked-download, serde, serde_jcs
// ============================================================================

//! ## Overview
//! Each test gets a run root holding `events.jsonl`, any JSON artifacts the
//! suite writes, and a closing summary:
//! - `summary.json`: JCS-canonical [`RunSummary`] with per-scenario results,
//!   pass/fail counts and teardown counts.
//! - `summary.md`: the same as a scenario table.
//!
//! The summary is written even when the test panics.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use system_tests::config::SystemTestConfig;
use system_tests::matrix::Expectation;
use system_tests::matrix::MatrixReport;
use system_tests::supervisor::StopReport;
use system_tests::validator::DownloadOutcome;
use system_tests::validator::ModeOutcome;

// ============================================================================
// SECTION: Run Root
// ============================================================================

/// Directory receiving one test's artifacts.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    root: PathBuf,
}

impl RunArtifacts {
    /// Creates `<run root>/<test_name>`, defaulting to `target/system-tests`.
    pub fn new(test_name: &str) -> io::Result<Self> {
        let config = SystemTestConfig::load().map_err(io::Error::other)?;
        let base = config.run_root.unwrap_or_else(|| {
            let pid = std::process::id();
            PathBuf::from("target/system-tests").join(format!("proxy_run_{pid}"))
        });
        let root = base.join(test_name);
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
        })
    }

    /// Returns the run root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the harness event log.
    pub fn events_log(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    /// Writes `value` as canonical JSON.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        let bytes = serde_jcs::to_vec(value).map_err(|err| io::Error::other(err.to_string()))?;
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

// ============================================================================
// SECTION: Summary Model
// ============================================================================

/// One scenario row of the summary.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioLine {
    name: String,
    expect: String,
    passed: bool,
    /// `mode=result` per download mode.
    modes: Vec<String>,
}

/// Teardown counts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TeardownCounts {
    killed: usize,
    already_exited: usize,
    errors: usize,
}

/// Closing record of one test.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    test_name: String,
    status: String,
    duration_ms: u128,
    scenarios_passed: usize,
    scenarios_failed: usize,
    scenarios: Vec<ScenarioLine>,
    teardown: Option<TeardownCounts>,
    notes: Vec<String>,
}

/// Labels an expectation the way outcomes are labelled.
fn expect_label(expect: Expectation) -> String {
    match expect {
        Expectation::Success => "success".to_string(),
        Expectation::Failure(kind) => format!("failure:{kind}"),
    }
}

/// Labels one mode's outcome.
fn outcome_label(outcome: &ModeOutcome) -> String {
    let result = match &outcome.outcome {
        DownloadOutcome::Success {
            content_matches: true,
            ..
        } => "success".to_string(),
        DownloadOutcome::Success {
            bytes_received,
            ..
        } => format!("success:wrong_bytes({bytes_received})"),
        DownloadOutcome::Failure {
            kind, ..
        } => format!("failure:{kind}"),
    };
    format!("{}={result}", outcome.mode)
}

// ============================================================================
// SECTION: Reporter
// ============================================================================

/// Collects matrix and teardown results and writes the summary once.
pub struct RunReporter {
    artifacts: RunArtifacts,
    test_name: String,
    started: Instant,
    scenarios: Vec<ScenarioLine>,
    teardown: Option<TeardownCounts>,
    notes: Vec<String>,
    finished: bool,
}

impl RunReporter {
    /// Creates a reporter and its run root.
    pub fn new(test_name: &str) -> io::Result<Self> {
        Ok(Self {
            artifacts: RunArtifacts::new(test_name)?,
            test_name: test_name.to_string(),
            started: Instant::now(),
            scenarios: Vec::new(),
            teardown: None,
            notes: Vec::new(),
            finished: false,
        })
    }

    /// Returns the run root.
    pub fn artifacts(&self) -> &RunArtifacts {
        &self.artifacts
    }

    /// Records every scenario of a matrix run.
    pub fn record_matrix(&mut self, report: &MatrixReport) {
        self.scenarios.extend(report.scenarios.iter().map(|scenario| ScenarioLine {
            name: scenario.name.clone(),
            expect: expect_label(scenario.expect),
            passed: scenario.passed(),
            modes: scenario.outcomes.iter().map(outcome_label).collect(),
        }));
    }

    /// Records the counts of a suite teardown.
    pub fn record_teardown(&mut self, report: &StopReport) {
        self.teardown = Some(TeardownCounts {
            killed: report.killed.len(),
            already_exited: report.already_exited.len(),
            errors: report.errors.len(),
        });
    }

    /// Adds a free-form note.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Writes `summary.json` and `summary.md` with `status`.
    pub fn finish(&mut self, status: &str) -> io::Result<()> {
        self.finished = true;
        let failed = self.scenarios.iter().filter(|line| !line.passed).count();
        let summary = RunSummary {
            test_name: self.test_name.clone(),
            status: status.to_string(),
            duration_ms: self.started.elapsed().as_millis(),
            scenarios_passed: self.scenarios.len() - failed,
            scenarios_failed: failed,
            scenarios: self.scenarios.clone(),
            teardown: self.teardown,
            notes: self.notes.clone(),
        };
        self.artifacts.write_json("summary.json", &summary)?;
        fs::write(self.artifacts.root.join("summary.md"), render_markdown(&summary))
    }
}

impl Drop for RunReporter {
    fn drop(&mut self) {
        if !self.finished {
            let status = if std::thread::panicking() { "panic" } else { "unfinished" };
            let _ = self.finish(status);
        }
    }
}

/// Renders the summary as a scenario table.
fn render_markdown(summary: &RunSummary) -> String {
    let mut out = format!(
        "# {}: {}\n\n{} passed, {} failed, {} ms\n",
        summary.test_name,
        summary.status,
        summary.scenarios_passed,
        summary.scenarios_failed,
        summary.duration_ms
    );
    if !summary.scenarios.is_empty() {
        out.push_str("\n| Scenario | Expected | Modes | Result |\n|---|---|---|---|\n");
        for line in &summary.scenarios {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                line.name,
                line.expect,
                line.modes.join(", "),
                if line.passed { "pass" } else { "FAIL" }
            );
        }
    }
    if let Some(teardown) = summary.teardown {
        let _ = writeln!(
            out,
            "\nTeardown: {} killed, {} already exited, {} errors",
            teardown.killed, teardown.already_exited, teardown.errors
        );
    }
    for note in &summary.notes {
        let _ = writeln!(out, "- {note}");
    }
    out
}
