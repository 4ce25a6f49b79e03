// system-tests/src/fixture.rs
// ============================================================================
// Module: Fixture Lifecycle
// Description: Suite-level helper servers and per-case scratch state.
// Purpose: Compose suite setup and teardown with per-case isolation.
// Dependencies: rand, tempfile
// ============================================================================

//! ## Overview
//! A [`ProxySuite`] owns everything that lives for a whole suite: the served
//! temporary directory, the generated TLS assets, the port plan and the five
//! supervised helpers. [`ProxySuite::begin_case`] hands out a [`TestCase`]
//! owning everything that lives for one case: an [`EnvScope`] and a fresh
//! target file in the served directory.
//!
//! Invariants:
//! - All five helpers are ready before any case begins.
//! - Dropping a case restores the environment, then removes its target file.
//! - Dropping a suite stops every helper, then removes the served directory
//!   (unless it was configured to be kept).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tempfile::NamedTempFile;
use tempfile::TempDir;

use crate::certs::CertificatePaths;
use crate::certs::generate_certificates;
use crate::config::SystemTestConfig;
use crate::env_scope::EnvScope;
use crate::error::HarnessError;
use crate::events::HarnessEvent;
use crate::events::HarnessEventSink;
use crate::ports::DEFAULT_PORT_RANGE;
use crate::ports::PortAllocator;
use crate::ports::PortPlan;
use crate::readiness::ReadinessPolicy;
use crate::roles::ServerRole;
use crate::supervisor::ProcessSupervisor;
use crate::supervisor::ServerCommand;
use crate::supervisor::StopReport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Smallest generated target body.
pub const TARGET_MIN_LEN: usize = 64;

/// Largest generated target body.
pub const TARGET_MAX_LEN: usize = 4096;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Helper executables launched by a suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixturePrograms {
    /// `fixture_origin` binary.
    pub origin: PathBuf,
    /// `fixture_proxy` binary.
    pub proxy: PathBuf,
}

impl FixturePrograms {
    /// Creates a program set.
    #[must_use]
    pub fn new(origin: impl Into<PathBuf>, proxy: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            proxy: proxy.into(),
        }
    }
}

/// Suite setup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteOptions {
    /// Candidate base ports.
    pub port_range: RangeInclusive<u16>,
    /// Helper readiness probing.
    pub readiness: ReadinessPolicy,
    /// Parent of the served directory; the system temp dir when unset.
    pub run_root: Option<PathBuf>,
    /// Keep the served directory after teardown.
    pub keep_workdir: bool,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            port_range: DEFAULT_PORT_RANGE,
            readiness: ReadinessPolicy::default(),
            run_root: None,
            keep_workdir: false,
        }
    }
}

impl SuiteOptions {
    /// Applies harness configuration over the defaults.
    #[must_use]
    pub fn from_config(config: &SystemTestConfig) -> Self {
        let defaults = Self::default();
        Self {
            port_range: config.port_range.clone().unwrap_or(defaults.port_range),
            readiness: config
                .ready_timeout
                .map_or(defaults.readiness, ReadinessPolicy::with_timeout),
            run_root: config.run_root.clone(),
            keep_workdir: config.keep_workdir,
        }
    }
}

// ============================================================================
// SECTION: Endpoints
// ============================================================================

/// Proxy URLs of a running suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoints {
    /// Forwarding proxy without `CONNECT`.
    pub dumb: String,
    /// Forwarding proxy with `CONNECT`.
    pub connect: String,
    /// TLS-intercepting proxy, reached over TLS.
    pub intercept: String,
}

impl ProxyEndpoints {
    /// Derives proxy URLs from a port plan.
    #[must_use]
    pub fn from_plan(plan: PortPlan) -> Self {
        Self {
            dumb: format!("http://127.0.0.1:{}", plan.port(ServerRole::DumbProxy)),
            connect: format!("http://127.0.0.1:{}", plan.port(ServerRole::ConnectProxy)),
            intercept: format!("https://127.0.0.1:{}", plan.port(ServerRole::InterceptProxy)),
        }
    }
}

/// Builds the launch commands for all five helpers.
#[must_use]
pub fn server_commands(
    programs: &FixturePrograms,
    plan: PortPlan,
    certs: &CertificatePaths,
) -> Vec<ServerCommand> {
    let command = |role: ServerRole, program: &Path| {
        let port = plan.port(role);
        ServerCommand::new(role, port, program).arg(port.to_string())
    };
    vec![
        command(ServerRole::OriginHttp, &programs.origin),
        command(ServerRole::OriginHttps, &programs.origin)
            .arg("--tls-cert")
            .arg(&certs.origin_cert)
            .arg("--tls-key")
            .arg(&certs.origin_key),
        command(ServerRole::DumbProxy, &programs.proxy).arg("dumb"),
        command(ServerRole::ConnectProxy, &programs.proxy).arg("connect"),
        command(ServerRole::InterceptProxy, &programs.proxy)
            .arg("intercept")
            .arg(&certs.origin_ca)
            .arg("--tls-cert")
            .arg(&certs.proxy_cert)
            .arg("--tls-key")
            .arg(&certs.proxy_key),
    ]
}

// ============================================================================
// SECTION: Suite
// ============================================================================

/// Helper servers and served directory for one suite.
///
/// Field order is teardown order: helpers stop before the directory goes.
pub struct ProxySuite {
    /// Supervised helpers.
    supervisor: ProcessSupervisor,
    /// Lifecycle event destination.
    events: Arc<dyn HarnessEventSink>,
    /// Port plan in use.
    plan: PortPlan,
    /// Generated TLS assets.
    certs: CertificatePaths,
    /// Proxy URLs.
    endpoints: ProxyEndpoints,
    /// Served directory path.
    root: PathBuf,
    /// Served directory guard.
    _workdir: TempDir,
}

impl ProxySuite {
    /// Creates the served directory, generates TLS assets, allocates ports,
    /// and starts all five helpers.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError`] when any step fails; helpers started before
    /// the failure are stopped.
    pub fn start(
        programs: &FixturePrograms,
        options: &SuiteOptions,
        events: Arc<dyn HarnessEventSink>,
    ) -> Result<Self, HarnessError> {
        let workdir = served_workdir(options)?;
        let root = workdir.path().to_path_buf();
        let certs = generate_certificates(&root)?;
        let plan = PortAllocator::new(options.port_range.clone())?.allocate_checked()?;

        let mut supervisor = ProcessSupervisor::new(Arc::clone(&events));
        let commands = server_commands(programs, plan, &certs);
        supervisor.start_all(&commands, &root, &options.readiness)?;
        events.record(
            &HarnessEvent::new("suite_started")
                .detail(format!("base_port={} root={}", plan.base(), root.display())),
        );

        Ok(Self {
            supervisor,
            events,
            plan,
            certs,
            endpoints: ProxyEndpoints::from_plan(plan),
            root,
            _workdir: workdir,
        })
    }

    /// Returns the served directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the port plan.
    #[must_use]
    pub const fn ports(&self) -> PortPlan {
        self.plan
    }

    /// Returns the generated TLS assets.
    #[must_use]
    pub const fn certificates(&self) -> &CertificatePaths {
        &self.certs
    }

    /// Returns the proxy URLs.
    #[must_use]
    pub const fn endpoints(&self) -> &ProxyEndpoints {
        &self.endpoints
    }

    /// Returns the helper supervisor.
    #[must_use]
    pub const fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Records an event on the suite's sink.
    pub fn record_event(&self, event: &HarnessEvent) {
        self.events.record(event);
    }

    /// Starts a case: locks the environment and writes a fresh target file.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] when the target file cannot be written.
    pub fn begin_case(&self, name: &str) -> Result<TestCase, HarnessError> {
        let env = EnvScope::acquire();
        let target = TargetFile::create(&self.root)?;
        let http_url = format!(
            "http://localhost:{}/{}",
            self.plan.port(ServerRole::OriginHttp),
            target.name()
        );
        let https_url = format!(
            "https://localhost:{}/{}",
            self.plan.port(ServerRole::OriginHttps),
            target.name()
        );
        Ok(TestCase {
            name: name.to_string(),
            env,
            target,
            http_url,
            https_url,
        })
    }

    /// Stops every helper. The served directory goes when the suite drops.
    pub fn stop(&mut self) -> StopReport {
        let report = self.supervisor.stop_all();
        if !report.is_empty() {
            self.events.record(&HarnessEvent::new("suite_stopped").detail(format!(
                "killed={} already_exited={} errors={}",
                report.killed.len(),
                report.already_exited.len(),
                report.errors.len()
            )));
        }
        report
    }

    /// Stops every helper and removes the served directory.
    pub fn shutdown(mut self) -> StopReport {
        self.stop()
    }
}

/// Creates the served directory, kept after drop when configured.
fn served_workdir(options: &SuiteOptions) -> io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("proxy-harness-").disable_cleanup(options.keep_workdir);
    match &options.run_root {
        Some(run_root) => {
            fs::create_dir_all(run_root)?;
            builder.tempdir_in(run_root)
        }
        None => builder.tempdir(),
    }
}

// ============================================================================
// SECTION: Target Files
// ============================================================================

/// Random alphanumeric file in the served directory.
#[derive(Debug)]
pub struct TargetFile {
    /// File handle; the file is removed when it drops.
    file: NamedTempFile,
    /// File name, which is also the URL path.
    name: String,
    /// Length on disk, measured once after writing.
    len: u64,
}

impl TargetFile {
    /// Writes a new target of random length into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created, written or measured.
    pub fn create(dir: &Path) -> io::Result<Self> {
        let mut rng = rand::thread_rng();
        let length = rng.gen_range(TARGET_MIN_LEN ..= TARGET_MAX_LEN);
        let body: Vec<u8> = (0 .. length).map(|_| rng.sample(Alphanumeric)).collect();
        Self::with_contents(dir, &body)
    }

    /// Writes a target with fixed contents into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created, written or measured.
    pub fn with_contents(dir: &Path, contents: &[u8]) -> io::Result<Self> {
        let mut file = tempfile::Builder::new().prefix("target-").suffix(".txt").tempfile_in(dir)?;
        file.write_all(contents)?;
        file.flush()?;
        let len = file.as_file().metadata()?.len();
        let name = file
            .path()
            .file_name()
            .and_then(OsStr::to_str)
            .map(str::to_string)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "target file name is not UTF-8"))?;
        Ok(Self {
            file,
            name,
            len,
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Returns the file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the byte length measured at creation.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for an empty target.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the file contents back.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        fs::read(self.file.path())
    }
}

// ============================================================================
// SECTION: Test Cases
// ============================================================================

/// Per-case state: environment scope, target file and origin URLs.
///
/// Field order is teardown order: the environment is restored before the
/// target file is removed.
#[derive(Debug)]
pub struct TestCase {
    /// Case label.
    name: String,
    /// Environment scope held for the whole case.
    env: EnvScope,
    /// File served for this case.
    target: TargetFile,
    /// Target URL on the HTTP origin.
    http_url: String,
    /// Target URL on the HTTPS origin.
    https_url: String,
}

impl TestCase {
    /// Returns the case label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target file.
    #[must_use]
    pub const fn target(&self) -> &TargetFile {
        &self.target
    }

    /// Returns the expected length for every download in this case.
    #[must_use]
    pub const fn expected_len(&self) -> u64 {
        self.target.len()
    }

    /// Returns the target URL on the HTTP origin.
    #[must_use]
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    /// Returns the target URL on the HTTPS origin.
    #[must_use]
    pub fn https_url(&self) -> &str {
        &self.https_url
    }

    /// Sets an environment variable for the rest of the case.
    pub fn set_env(&mut self, key: &str, value: impl AsRef<OsStr>) {
        self.env.set_scoped(key, value);
    }

    /// Unsets an environment variable for the rest of the case.
    pub fn remove_env(&mut self, key: &str) {
        self.env.remove_scoped(key);
    }

    /// Returns the case's environment scope.
    #[must_use]
    pub const fn env(&self) -> &EnvScope {
        &self.env
    }

    /// Returns the case's environment scope for direct manipulation.
    pub const fn env_mut(&mut self) -> &mut EnvScope {
        &mut self.env
    }

    /// Restores the environment and removes the target file.
    pub fn finish(mut self) {
        self.env.restore_all();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::path::Path;

    use super::FixturePrograms;
    use super::ProxyEndpoints;
    use super::SuiteOptions;
    use super::TARGET_MAX_LEN;
    use super::TARGET_MIN_LEN;
    use super::TargetFile;
    use super::served_workdir;
    use super::server_commands;
    use crate::certs::CertificatePaths;
    use crate::config::SystemTestConfig;
    use crate::ports::PortPlan;
    use crate::roles::ServerRole;

    #[test]
    fn served_workdir_is_removed_unless_kept() {
        let run_root = tempfile::tempdir().unwrap();
        let mut options = SuiteOptions {
            run_root: Some(run_root.path().join("runs")),
            ..SuiteOptions::default()
        };

        let removed = served_workdir(&options).unwrap();
        let removed_path = removed.path().to_path_buf();
        assert!(removed_path.starts_with(run_root.path().join("runs")));
        drop(removed);
        assert!(!removed_path.exists());

        options.keep_workdir = true;
        let kept = served_workdir(&options).unwrap();
        let kept_path = kept.path().to_path_buf();
        drop(kept);
        assert!(kept_path.is_dir());
        assert!(kept_path.file_name().unwrap().to_string_lossy().starts_with("proxy-harness-"));
    }

    #[test]
    fn target_files_are_alphanumeric_and_measured() {
        let dir = tempfile::tempdir().unwrap();
        let target = TargetFile::create(dir.path()).unwrap();
        let contents = target.contents().unwrap();
        assert_eq!(contents.len() as u64, target.len());
        assert!((TARGET_MIN_LEN ..= TARGET_MAX_LEN).contains(&contents.len()));
        assert!(contents.iter().all(u8::is_ascii_alphanumeric));
        assert!(target.path().starts_with(dir.path()));
        assert!(target.name().starts_with("target-"));
    }

    #[test]
    fn target_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = TargetFile::with_contents(dir.path(), b"abc").unwrap();
        let path = target.path().to_path_buf();
        assert_eq!(target.len(), 3);
        drop(target);
        assert!(!path.exists());
    }

    #[test]
    fn endpoints_follow_port_offsets() {
        let endpoints = ProxyEndpoints::from_plan(PortPlan::from_base(31000).unwrap());
        assert_eq!(endpoints.dumb, "http://127.0.0.1:31002");
        assert_eq!(endpoints.connect, "http://127.0.0.1:31003");
        assert_eq!(endpoints.intercept, "https://127.0.0.1:31004");
    }

    #[test]
    fn commands_carry_ports_modes_and_tls_paths() {
        let programs = FixturePrograms::new("/bin/origin", "/bin/proxy");
        let certs = CertificatePaths::under(Path::new("/srv"));
        let plan = PortPlan::from_base(32000).unwrap();
        let commands = server_commands(&programs, plan, &certs);

        let roles: Vec<ServerRole> = commands.iter().map(|command| command.role).collect();
        assert_eq!(roles, ServerRole::ALL.to_vec());
        for command in &commands {
            assert_eq!(command.port, plan.port(command.role));
            assert_eq!(command.args[0], command.port.to_string().as_str());
        }
        let intercept = &commands[4];
        assert_eq!(intercept.program, Path::new("/bin/proxy"));
        assert_eq!(intercept.args[1], "intercept");
        assert_eq!(intercept.args[2], certs.origin_ca.as_os_str());
        assert!(intercept.args.iter().any(|arg| arg == certs.proxy_key.as_os_str()));
        assert_eq!(commands[0].args.len(), 1);
        assert_eq!(commands[2].args[1], "dumb");
        assert_eq!(commands[3].args[1], "connect");
    }

    #[test]
    fn options_apply_config_overrides() {
        let config = SystemTestConfig {
            port_range: Some(33000 ..= 33100),
            ready_timeout: Some(std::time::Duration::from_secs(3)),
            keep_workdir: true,
            ..SystemTestConfig::default()
        };
        let options = SuiteOptions::from_config(&config);
        assert_eq!(options.port_range, 33000 ..= 33100);
        assert_eq!(options.readiness.timeout, std::time::Duration::from_secs(3));
        assert!(options.keep_workdir);
        assert_eq!(SuiteOptions::from_config(&SystemTestConfig::default()), SuiteOptions::default());
    }
}
