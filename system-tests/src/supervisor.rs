// system-tests/src/supervisor.rs
// ============================================================================
// Module: Process Supervisor
// Description: Spawns, probes and terminates the helper server processes.
// Purpose: Own every helper child for exactly one suite lifetime.
// Dependencies: checked-download, serde
// ============================================================================

//! ## Overview
//! The supervisor launches one child per [`ServerRole`], drains each child's
//! stderr on a reader thread, and blocks until every assigned port accepts a
//! TCP connection. Teardown force-kills whatever is still running and reaps
//! it; processes that already exited are reported, never treated as errors.
//!
//! Invariants:
//! - One live process per role between `start_all` and `stop_all`.
//! - `stop_all` is idempotent and also runs on drop.
//! - Children never inherit the proxy variables of the harness process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::io;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStderr;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use checked_download::CA_BUNDLE_VAR;
use checked_download::HTTP_PROXY_VAR;
use checked_download::HTTPS_PROXY_VAR;
use serde::Serialize;

use crate::error::HarnessError;
use crate::events::HarnessEvent;
use crate::events::HarnessEventSink;
use crate::readiness::ReadinessFailure;
use crate::readiness::ReadinessPolicy;
use crate::readiness::wait_for_port;
use crate::roles::ServerRole;

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Launch description for one helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    /// Role the helper plays.
    pub role: ServerRole,
    /// Port the helper must listen on.
    pub port: u16,
    /// Executable path.
    pub program: PathBuf,
    /// Arguments after the program name.
    pub args: Vec<OsString>,
}

impl ServerCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(role: ServerRole, port: u16, program: impl Into<PathBuf>) -> Self {
        Self {
            role,
            port,
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

// ============================================================================
// SECTION: Processes
// ============================================================================

/// How long a process that could not be killed is given to exit on its own.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting out [`KILL_GRACE`].
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a process left supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    /// The supervisor killed it.
    Killed,
    /// It had already exited.
    AlreadyExited(ExitStatus),
}

/// A running helper and its captured stderr.
#[derive(Debug)]
pub struct ServerProcess {
    /// Role the helper plays.
    role: ServerRole,
    /// Assigned port.
    port: u16,
    /// OS child handle.
    child: Child,
    /// Bytes drained from the child's stderr.
    stderr: Arc<Mutex<Vec<u8>>>,
    /// Thread draining stderr; joined once the child is gone.
    reader: Option<JoinHandle<()>>,
    /// Exit status once observed.
    exit: Option<ExitStatus>,
}

impl ServerProcess {
    /// Returns the helper role.
    #[must_use]
    pub const fn role(&self) -> ServerRole {
        self.role
    }

    /// Returns the assigned port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Returns the stderr captured so far, lossily decoded.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        let buffer = self.stderr.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Returns the exit status if the process has exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait().ok().flatten();
        }
        self.exit
    }

    /// Kills the process unless it already exited, reaps it, and waits for
    /// the stderr reader to drain.
    fn terminate(&mut self) -> io::Result<Termination> {
        let outcome = if let Some(status) = self.try_exit_status() {
            Termination::AlreadyExited(status)
        } else {
            match self.child.kill() {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
                Err(err) => return self.reap_after_failed_kill(err, KILL_GRACE),
            }
            match self.child.wait() {
                Ok(status) => self.exit = Some(status),
                Err(err) => return self.reap_after_failed_kill(err, KILL_GRACE),
            }
            Termination::Killed
        };
        self.join_reader();
        Ok(outcome)
    }

    /// Polls for up to `grace` after a kill or wait failure.
    ///
    /// A process that exits in time is reaped and its reader joined. One that
    /// is still running yields `err`; its reader is left detached because it
    /// only finishes once the child closes stderr.
    fn reap_after_failed_kill(
        &mut self,
        err: io::Error,
        grace: Duration,
    ) -> io::Result<Termination> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.try_exit_status() {
                self.join_reader();
                return Ok(Termination::AlreadyExited(status));
            }
            if Instant::now() >= deadline {
                return Err(err);
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }

    /// Joins the stderr reader if it is still attached.
    fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Copies `stderr` into `buffer` until EOF.
fn drain_stderr(mut stderr: ChildStderr, buffer: &Mutex<Vec<u8>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                buffer.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&chunk[.. read]);
            }
        }
    }
}

// ============================================================================
// SECTION: Stop Report
// ============================================================================

/// Result of tearing down the supervised processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Roles that were running and got killed.
    pub killed: Vec<ServerRole>,
    /// Roles that had exited before teardown.
    pub already_exited: Vec<ServerRole>,
    /// Kill or reap failures, one message per role.
    pub errors: Vec<String>,
}

impl StopReport {
    /// Returns the number of processes this teardown handled.
    #[must_use]
    pub fn stopped(&self) -> usize {
        self.killed.len() + self.already_exited.len()
    }

    /// Returns true when teardown had nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stopped() == 0 && self.errors.is_empty()
    }
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Owner of every helper process of a suite.
pub struct ProcessSupervisor {
    /// Processes in spawn order.
    processes: Vec<ServerProcess>,
    /// Lifecycle event destination.
    events: Arc<dyn HarnessEventSink>,
}

impl ProcessSupervisor {
    /// Creates an empty supervisor.
    #[must_use]
    pub fn new(events: Arc<dyn HarnessEventSink>) -> Self {
        Self {
            processes: Vec::new(),
            events,
        }
    }

    /// Returns the supervised processes in spawn order.
    #[must_use]
    pub fn processes(&self) -> &[ServerProcess] {
        &self.processes
    }

    /// Returns the process playing `role`.
    #[must_use]
    pub fn process(&self, role: ServerRole) -> Option<&ServerProcess> {
        self.processes.iter().find(|process| process.role == role)
    }

    /// Spawns one helper without waiting for readiness and returns its pid.
    ///
    /// The child runs in `cwd` with stdin and stdout discarded, stderr
    /// captured, and the proxy variables removed from its environment.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the OS refuses to start it.
    pub fn spawn(&mut self, command: &ServerCommand, cwd: &Path) -> Result<u32, HarnessError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .env_remove(HTTP_PROXY_VAR)
            .env_remove(HTTPS_PROXY_VAR)
            .env_remove(CA_BUNDLE_VAR)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                role: command.role,
                program: command.program.display().to_string(),
                source,
            })?;

        let stderr = Arc::new(Mutex::new(Vec::new()));
        let reader = child.stderr.take().map(|pipe| {
            let buffer = Arc::clone(&stderr);
            thread::spawn(move || drain_stderr(pipe, &buffer))
        });
        let process = ServerProcess {
            role: command.role,
            port: command.port,
            child,
            stderr,
            reader,
            exit: None,
        };
        let pid = process.pid();
        self.events.record(&HarnessEvent::process("spawned", process.role, process.port, pid));
        self.processes.push(process);
        Ok(pid)
    }

    /// Spawns every command, then blocks until each port accepts connections.
    ///
    /// Any failure stops every process started so far before returning.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`], [`HarnessError::ExitedEarly`] or
    /// [`HarnessError::NotReady`] for the first helper that failed.
    pub fn start_all(
        &mut self,
        commands: &[ServerCommand],
        cwd: &Path,
        policy: &ReadinessPolicy,
    ) -> Result<(), HarnessError> {
        for command in commands {
            if let Err(err) = self.spawn(command, cwd) {
                self.stop_all();
                return Err(err);
            }
        }
        let failure = self.await_ready(policy);
        if let Some(err) = failure {
            self.record_failure(&err);
            self.stop_all();
            return Err(err);
        }
        Ok(())
    }

    /// Probes each process in spawn order; returns the first failure.
    fn await_ready(&mut self, policy: &ReadinessPolicy) -> Option<HarnessError> {
        for process in &mut self.processes {
            let port = process.port;
            let outcome = wait_for_port(port, policy, || process.try_exit_status());
            match outcome {
                Ok(attempts) => {
                    self.events.record(
                        &HarnessEvent::process("ready", process.role, port, process.pid())
                            .detail(format!("attempts={attempts}")),
                    );
                }
                Err(ReadinessFailure::Exited {
                    status, ..
                }) => {
                    let _ = process.terminate();
                    return Some(HarnessError::ExitedEarly {
                        role: process.role,
                        port,
                        status,
                        stderr: process.stderr_text(),
                    });
                }
                Err(ReadinessFailure::TimedOut {
                    attempts,
                }) => {
                    let _ = process.terminate();
                    return Some(HarnessError::NotReady {
                        role: process.role,
                        port,
                        attempts,
                        stderr: process.stderr_text(),
                    });
                }
            }
        }
        None
    }

    /// Records a setup failure event.
    fn record_failure(&self, err: &HarnessError) {
        self.events.record(&HarnessEvent::new("start_failed").detail(err.to_string()));
    }

    /// Kills and reaps every process still supervised.
    ///
    /// Never fails: processes that already exited are reported, and kill
    /// errors are collected into the report. A second call returns an empty
    /// report.
    pub fn stop_all(&mut self) -> StopReport {
        let mut report = StopReport::default();
        for mut process in self.processes.drain(..) {
            let pid = process.pid();
            match process.terminate() {
                Ok(Termination::Killed) => {
                    report.killed.push(process.role);
                    self.events.record(&HarnessEvent::process(
                        "killed",
                        process.role,
                        process.port,
                        pid,
                    ));
                }
                Ok(Termination::AlreadyExited(status)) => {
                    report.already_exited.push(process.role);
                    self.events.record(
                        &HarnessEvent::process("already_exited", process.role, process.port, pid)
                            .detail(status.to_string()),
                    );
                }
                Err(err) => {
                    report.errors.push(format!("{}: {err}", process.role));
                    self.events.record(
                        &HarnessEvent::process("stop_failed", process.role, process.port, pid)
                            .detail(err.to_string()),
                    );
                }
            }
        }
        report
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::panic,
        reason = "Test-only assertions are permitted."
    )]

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use std::time::Instant;

    use super::ProcessSupervisor;
    use super::ServerCommand;
    use super::Termination;
    use crate::error::HarnessError;
    use crate::events::MemoryEventSink;
    use crate::readiness::ReadinessPolicy;
    use crate::roles::ServerRole;

    /// Supervisor wired to an in-memory sink.
    fn supervisor() -> (ProcessSupervisor, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        (ProcessSupervisor::new(sink.clone()), sink)
    }

    /// Policy short enough for unit tests.
    fn quick_policy() -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_millis(300),
            interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn stop_all_kills_running_processes_once() {
        let (mut supervisor, sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let command = ServerCommand::new(ServerRole::OriginHttp, 1, "sleep").arg("30");
        supervisor.spawn(&command, cwd.path()).unwrap();

        let report = supervisor.stop_all();
        assert_eq!(report.killed, vec![ServerRole::OriginHttp]);
        assert!(report.errors.is_empty());
        assert_eq!(sink.named("killed").len(), 1);

        let second = supervisor.stop_all();
        assert!(second.is_empty());
        assert_eq!(sink.named("killed").len(), 1);
    }

    #[test]
    fn stop_all_tolerates_exited_processes() {
        let (mut supervisor, sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let command = ServerCommand::new(ServerRole::DumbProxy, 1, "true");
        supervisor.spawn(&command, cwd.path()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.processes[0].try_exit_status().is_none() {
            assert!(Instant::now() < deadline, "process did not exit");
            thread::sleep(Duration::from_millis(10));
        }

        let report = supervisor.stop_all();
        assert_eq!(report.already_exited, vec![ServerRole::DumbProxy]);
        assert!(report.killed.is_empty());
        assert_eq!(sink.named("already_exited").len(), 1);
    }

    #[test]
    fn failed_kill_still_reaps_a_process_that_exits() {
        let (mut supervisor, _sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let command = ServerCommand::new(ServerRole::OriginHttps, 1, "sh")
            .arg("-c")
            .arg("echo shutting down >&2; sleep 0.2");
        supervisor.spawn(&command, cwd.path()).unwrap();
        let mut process = supervisor.processes.pop().unwrap();

        let outcome = process
            .reap_after_failed_kill(std::io::Error::other("kill denied"), Duration::from_secs(5))
            .unwrap();
        assert!(matches!(outcome, Termination::AlreadyExited(status) if status.success()));
        assert!(process.reader.is_none());
        assert!(process.stderr_text().contains("shutting down"));
    }

    #[test]
    fn failed_kill_of_a_live_process_reports_the_error() {
        let (mut supervisor, _sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let command = ServerCommand::new(ServerRole::ConnectProxy, 1, "sleep").arg("30");
        supervisor.spawn(&command, cwd.path()).unwrap();
        let mut process = supervisor.processes.pop().unwrap();

        let err = process
            .reap_after_failed_kill(std::io::Error::other("kill denied"), Duration::from_millis(60))
            .unwrap_err();
        assert_eq!(err.to_string(), "kill denied");
        assert!(process.exit.is_none());

        assert_eq!(process.terminate().unwrap(), Termination::Killed);
        assert!(process.reader.is_none());
    }

    #[test]
    fn early_exit_reports_stderr_and_stops_everything() {
        let (mut supervisor, sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let commands = [
            ServerCommand::new(ServerRole::OriginHttp, 1, "sh")
                .arg("-c")
                .arg("echo bind failed >&2; exit 3"),
            ServerCommand::new(ServerRole::ConnectProxy, 2, "sleep").arg("30"),
        ];

        let policy = ReadinessPolicy {
            timeout: Duration::from_secs(5),
            ..quick_policy()
        };
        let err = supervisor.start_all(&commands, cwd.path(), &policy).unwrap_err();
        match err {
            HarnessError::ExitedEarly {
                role,
                port,
                status,
                stderr,
            } => {
                assert_eq!(role, ServerRole::OriginHttp);
                assert_eq!(port, 1);
                assert_eq!(status.code(), Some(3));
                assert!(stderr.contains("bind failed"), "stderr: {stderr}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(supervisor.processes().is_empty());
        assert_eq!(sink.named("start_failed").len(), 1);
        assert_eq!(sink.named("killed").len(), 1);
    }

    #[test]
    fn silent_process_is_not_ready() {
        let (mut supervisor, _sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let commands = [ServerCommand::new(ServerRole::InterceptProxy, port, "sleep").arg("30")];

        let err = supervisor.start_all(&commands, cwd.path(), &quick_policy()).unwrap_err();
        assert!(matches!(err, HarnessError::NotReady { role: ServerRole::InterceptProxy, .. }));
        assert!(supervisor.processes().is_empty());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let (mut supervisor, _sink) = supervisor();
        let cwd = tempfile::tempdir().unwrap();
        let commands = [
            ServerCommand::new(ServerRole::OriginHttp, 1, "sleep").arg("30"),
            ServerCommand::new(ServerRole::OriginHttps, 2, "/nonexistent/fixture_origin"),
        ];

        let err = supervisor.start_all(&commands, cwd.path(), &quick_policy()).unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { role: ServerRole::OriginHttps, .. }));
        assert!(supervisor.processes().is_empty());
    }
}
