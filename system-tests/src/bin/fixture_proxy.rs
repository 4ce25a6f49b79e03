// system-tests/src/bin/fixture_proxy.rs
// ============================================================================
// Module: Fixture Proxy Server
// Description: Forwarding, tunnelling and intercepting proxy for suites.
// Purpose: Run one proxy flavour on a loopback port.
// Dependencies: clap, proxy-fixtures, tokio
// ============================================================================

//! Proxy server binary for system-tests.
//!
//! - `fixture_proxy <PORT> dumb`: forwarding only, `CONNECT` gets `501`.
//! - `fixture_proxy <PORT> connect`: forwarding plus `CONNECT` tunnels.
//! - `fixture_proxy <PORT> intercept <UPSTREAM_CA>`: TLS-terminating proxy.
//!   Its own identity defaults to `ssl_certs/proxy_server.crt` and
//!   `ssl_certs/proxy_server.key` under the working directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use proxy_fixtures::ProxyConfig;
use proxy_fixtures::ProxyMode;
use proxy_fixtures::TlsIdentity;
use proxy_fixtures::log::FixtureEvent;
use proxy_fixtures::run_proxy;

/// Default intercepting identity certificate, relative to the working directory.
const DEFAULT_PROXY_CERT: &str = "ssl_certs/proxy_server.crt";

/// Default intercepting identity key, relative to the working directory.
const DEFAULT_PROXY_KEY: &str = "ssl_certs/proxy_server.key";

/// Proxy server arguments.
#[derive(Parser, Debug)]
#[command(name = "fixture_proxy")]
struct Args {
    /// Loopback port to listen on.
    port: u16,
    /// Proxy flavour: dumb, connect or intercept.
    mode: ProxyMode,
    /// CA certificate trusted for upstream HTTPS (intercept mode).
    upstream_ca: Option<PathBuf>,
    /// PEM certificate chain presented to clients (intercept mode).
    #[arg(long, value_name = "CRT")]
    tls_cert: Option<PathBuf>,
    /// PEM private key for `--tls-cert` (intercept mode).
    #[arg(long, value_name = "KEY")]
    tls_key: Option<PathBuf>,
}

impl Args {
    /// Resolves the proxy settings, applying the intercept identity defaults.
    fn into_config(self) -> ProxyConfig {
        let identity = match self.mode {
            ProxyMode::Intercept => Some(TlsIdentity::new(
                self.tls_cert.unwrap_or_else(|| PathBuf::from(DEFAULT_PROXY_CERT)),
                self.tls_key.unwrap_or_else(|| PathBuf::from(DEFAULT_PROXY_KEY)),
            )),
            ProxyMode::Dumb | ProxyMode::Connect => None,
        };
        ProxyConfig {
            port: self.port,
            mode: self.mode,
            upstream_ca: self.upstream_ca,
            identity,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let config = Args::parse().into_config();
    let server = config.mode.server_label();
    match run_proxy(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            FixtureEvent::new(server, "fatal").detail(err.to_string()).emit();
            ExitCode::FAILURE
        }
    }
}
