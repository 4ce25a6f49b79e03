// system-tests/src/bin/fixture_origin.rs
// ============================================================================
// Module: Fixture Origin Server
// Description: Static file server launched by proxy topology suites.
// Purpose: Serve the suite directory over HTTP or HTTPS on a loopback port.
// Dependencies: clap, proxy-fixtures, tokio
// ============================================================================

//! Origin file server binary for system-tests.
//!
//! `fixture_origin <PORT>` serves the working directory over HTTP;
//! `fixture_origin <PORT> --tls-cert <CRT> --tls-key <KEY>` serves it over
//! HTTPS.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use proxy_fixtures::OriginConfig;
use proxy_fixtures::TlsIdentity;
use proxy_fixtures::log::FixtureEvent;
use proxy_fixtures::run_origin;

/// Origin server arguments.
#[derive(Parser, Debug)]
#[command(name = "fixture_origin")]
struct Args {
    /// Loopback port to listen on.
    port: u16,
    /// PEM certificate chain; enables HTTPS.
    #[arg(long, value_name = "CRT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    /// PEM private key for `--tls-cert`.
    #[arg(long, value_name = "KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
    /// Directory to serve.
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let tls = match (args.tls_cert, args.tls_key) {
        (Some(cert), Some(key)) => Some(TlsIdentity::new(cert, key)),
        _ => None,
    };
    let server = if tls.is_some() { "origin_https" } else { "origin_http" };
    let config = OriginConfig {
        port: args.port,
        root: args.root,
        tls,
    };
    match run_origin(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            FixtureEvent::new(server, "fatal").detail(err.to_string()).emit();
            ExitCode::FAILURE
        }
    }
}
