// system-tests/tests/helpers/suite.rs
// ============================================================================
// Module: Suite Startup
// Description: Starts proxy suites from harness configuration.
// Purpose: Wire the fixture binaries, config and event log together.
// Dependencies: system-tests
// ============================================================================

use std::sync::Arc;

use system_tests::FixturePrograms;
use system_tests::ProxySuite;
use system_tests::SuiteOptions;
use system_tests::config::SystemTestConfig;
use system_tests::events::FanoutEventSink;
use system_tests::events::FileEventSink;
use system_tests::events::HarnessEventSink;
use system_tests::events::MemoryEventSink;
use system_tests::events::StderrEventSink;

use super::artifacts::RunArtifacts;

/// Fixture binaries built alongside this test.
pub fn fixture_programs() -> FixturePrograms {
    FixturePrograms::new(env!("CARGO_BIN_EXE_fixture_origin"), env!("CARGO_BIN_EXE_fixture_proxy"))
}

/// Running suite plus the in-memory copy of its events.
pub struct StartedSuite {
    pub suite: ProxySuite,
    pub events: Arc<MemoryEventSink>,
    pub config: SystemTestConfig,
}

/// Starts a suite logging events to stderr, `events.jsonl` and memory.
pub fn start_suite(artifacts: &RunArtifacts) -> Result<StartedSuite, Box<dyn std::error::Error>> {
    let config = SystemTestConfig::load()?;
    let memory = Arc::new(MemoryEventSink::new());
    let file = Arc::new(FileEventSink::new(&artifacts.events_log())?);
    let sinks: Vec<Arc<dyn HarnessEventSink>> = vec![Arc::new(StderrEventSink), file, memory.clone()];
    let events: Arc<dyn HarnessEventSink> = Arc::new(FanoutEventSink::new(sinks));
    let options = SuiteOptions::from_config(&config);
    let suite = ProxySuite::start(&fixture_programs(), &options, events)?;
    Ok(StartedSuite {
        suite,
        events: memory,
        config,
    })
}
