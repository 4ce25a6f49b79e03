// crates/proxy-fixtures/src/proxy.rs
// ============================================================================
// Module: Proxy Servers
// Description: Dumb, CONNECT-capable and intercepting HTTP proxies.
// Purpose: Reproduce the proxy topologies a download client must traverse.
// Dependencies: hyper, hyper-util, tokio, tokio-rustls
// ============================================================================

//! ## Overview
//! All three flavours forward absolute-form requests (`GET http://host/x`).
//! They differ in how they answer `CONNECT host:port`:
//! - [`ProxyMode::Dumb`] answers `501 Not Implemented`, so HTTPS through it
//!   fails with a tunnel error on the client.
//! - [`ProxyMode::Connect`] dials the authority and splices bytes both ways.
//! - [`ProxyMode::Intercept`] answers `200`, terminates TLS inside the tunnel
//!   with its own certificate and re-issues each request to the real origin.
//!   The intercepting proxy also listens with TLS, so clients reach it through
//!   an `https://` proxy URL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use hyper::Method;
use hyper::Request;
use hyper::StatusCode;
use hyper::Uri;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::error::FixtureError;
use crate::forward::Forwarder;
use crate::log::FixtureEvent;
use crate::serve::FixtureResponse;
use crate::serve::bind_loopback;
use crate::serve::empty_response;
use crate::serve::serve;
use crate::serve::serve_connection;
use crate::serve::text_response;
use crate::tls::TlsIdentity;
use crate::tls::tls_acceptor;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Proxy behaviour selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyMode {
    /// Forwarding only; `CONNECT` is rejected.
    Dumb,
    /// Forwarding plus `CONNECT` tunnelling.
    Connect,
    /// TLS-terminating proxy that re-originates requests.
    Intercept,
}

impl ProxyMode {
    /// Returns the command-line label for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dumb => "dumb",
            Self::Connect => "connect",
            Self::Intercept => "intercept",
        }
    }

    /// Returns the server label used in fixture events.
    #[must_use]
    pub const fn server_label(self) -> &'static str {
        match self {
            Self::Dumb => "dumb_proxy",
            Self::Connect => "connect_proxy",
            Self::Intercept => "intercept_proxy",
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dumb" => Ok(Self::Dumb),
            "connect" => Ok(Self::Connect),
            "intercept" => Ok(Self::Intercept),
            other => Err(format!("unknown proxy mode {other} (expected dumb, connect or intercept)")),
        }
    }
}

/// Proxy server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Loopback port to listen on.
    pub port: u16,
    /// Proxy behaviour.
    pub mode: ProxyMode,
    /// Extra CA trusted for upstream HTTPS.
    pub upstream_ca: Option<PathBuf>,
    /// Own TLS identity; required for [`ProxyMode::Intercept`].
    pub identity: Option<TlsIdentity>,
}

/// Shared per-server state.
pub struct ProxyState {
    /// Proxy behaviour.
    mode: ProxyMode,
    /// Upstream client.
    forwarder: Forwarder,
    /// Acceptor for the listener and for intercepted tunnels.
    interceptor: Option<TlsAcceptor>,
}

impl ProxyState {
    /// Builds the state for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream CA or the interception identity
    /// cannot be loaded, or when intercept mode has no identity.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, FixtureError> {
        let forwarder = Forwarder::new(config.upstream_ca.as_deref())?;
        let interceptor = match (config.mode, &config.identity) {
            (ProxyMode::Intercept, Some(identity)) => Some(tls_acceptor(identity)?),
            (ProxyMode::Intercept, None) => {
                return Err(FixtureError::Config(
                    "intercept mode requires a TLS identity".to_string(),
                ));
            }
            (ProxyMode::Dumb | ProxyMode::Connect, _) => None,
        };
        Ok(Self {
            mode: config.mode,
            forwarder,
            interceptor,
        })
    }

    /// Returns the proxy behaviour.
    #[must_use]
    pub const fn mode(&self) -> ProxyMode {
        self.mode
    }
}

// ============================================================================
// SECTION: Entry Points
// ============================================================================

/// Binds the configured port and proxies until the process exits.
///
/// # Errors
///
/// Returns an error when the state cannot be built or the port cannot be
/// bound.
pub async fn run_proxy(config: ProxyConfig) -> Result<(), FixtureError> {
    let state = ProxyState::from_config(&config)?;
    let listener = bind_loopback(config.port).await?;
    serve_proxy(listener, Arc::new(state)).await;
    Ok(())
}

/// Proxies connections from an already bound listener.
pub async fn serve_proxy(listener: TcpListener, state: Arc<ProxyState>) {
    let server = state.mode.server_label();
    let port = listener.local_addr().map(|addr| addr.port()).unwrap_or_default();
    FixtureEvent::new(server, "listening").detail(format!("127.0.0.1:{port}")).emit();
    let tls = state.interceptor.clone();
    serve(listener, tls, server, move |request| handle(Arc::clone(&state), request)).await;
}

// ============================================================================
// SECTION: Request Handling
// ============================================================================

/// Routes one proxy request.
async fn handle(state: Arc<ProxyState>, request: Request<Incoming>) -> FixtureResponse {
    let server = state.mode.server_label();
    if request.method() == Method::CONNECT {
        return match state.mode {
            ProxyMode::Dumb => {
                let target = request.uri().to_string();
                FixtureEvent::new(server, "connect_rejected")
                    .request("CONNECT", target)
                    .status(StatusCode::NOT_IMPLEMENTED.as_u16())
                    .emit();
                text_response(StatusCode::NOT_IMPLEMENTED, "CONNECT is not supported\n")
            }
            ProxyMode::Connect => tunnel(server, request).await,
            ProxyMode::Intercept => intercept(state, request),
        };
    }
    match absolute_target(request.uri()) {
        Some(target) => state.forwarder.forward(server, request, target).await,
        None => {
            let target = request.uri().to_string();
            FixtureEvent::new(server, "not_absolute_form")
                .request(request.method().as_str(), target)
                .status(StatusCode::BAD_REQUEST.as_u16())
                .emit();
            text_response(StatusCode::BAD_REQUEST, "proxy requests must use absolute-form\n")
        }
    }
}

/// Opens a byte tunnel to the `CONNECT` authority.
async fn tunnel(server: &'static str, request: Request<Incoming>) -> FixtureResponse {
    let Some(authority) = request.uri().authority().map(ToString::to_string) else {
        return text_response(StatusCode::BAD_REQUEST, "CONNECT requires host:port\n");
    };
    let upstream = match TcpStream::connect(authority.as_str()).await {
        Ok(upstream) => upstream,
        Err(err) => {
            FixtureEvent::new(server, "tunnel_connect_failed")
                .request("CONNECT", authority)
                .status(StatusCode::BAD_GATEWAY.as_u16())
                .detail(err.to_string())
                .emit();
            return text_response(StatusCode::BAD_GATEWAY, format!("{err}\n"));
        }
    };
    FixtureEvent::new(server, "tunnel_opened")
        .request("CONNECT", authority.clone())
        .status(StatusCode::OK.as_u16())
        .emit();
    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(request).await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                FixtureEvent::new(server, "upgrade_failed").detail(err.to_string()).emit();
                return;
            }
        };
        let mut client = TokioIo::new(upgraded);
        let mut upstream = upstream;
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((sent, received)) => FixtureEvent::new(server, "tunnel_closed")
                .request("CONNECT", authority)
                .detail(format!("sent={sent} received={received}"))
                .emit(),
            Err(err) => FixtureEvent::new(server, "tunnel_failed")
                .request("CONNECT", authority)
                .detail(err.to_string())
                .emit(),
        }
    });
    empty_response(StatusCode::OK)
}

/// Accepts a `CONNECT` and terminates TLS inside the tunnel.
fn intercept(state: Arc<ProxyState>, request: Request<Incoming>) -> FixtureResponse {
    let server = state.mode.server_label();
    let Some(authority) = request.uri().authority().map(ToString::to_string) else {
        return text_response(StatusCode::BAD_REQUEST, "CONNECT requires host:port\n");
    };
    let Some(acceptor) = state.interceptor.clone() else {
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "no interception identity\n");
    };
    FixtureEvent::new(server, "intercept_opened")
        .request("CONNECT", authority.clone())
        .status(StatusCode::OK.as_u16())
        .emit();
    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(request).await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                FixtureEvent::new(server, "upgrade_failed").detail(err.to_string()).emit();
                return;
            }
        };
        let stream = match acceptor.accept(TokioIo::new(upgraded)).await {
            Ok(stream) => stream,
            Err(err) => {
                FixtureEvent::new(server, "intercept_handshake_failed")
                    .request("CONNECT", authority)
                    .detail(err.to_string())
                    .emit();
                return;
            }
        };
        let authority = Arc::new(authority);
        serve_connection(TokioIo::new(stream), server, move |inner| {
            let state = Arc::clone(&state);
            let authority = Arc::clone(&authority);
            async move {
                let path = inner.uri().path_and_query().map_or("/", |pq| pq.as_str()).to_string();
                let target = format!("https://{authority}{path}");
                state.forwarder.forward(server, inner, target).await
            }
        })
        .await;
    });
    empty_response(StatusCode::OK)
}

/// Returns the full target URL for an absolute-form request.
#[must_use]
pub fn absolute_target(uri: &Uri) -> Option<String> {
    match (uri.scheme_str(), uri.authority()) {
        (Some("http" | "https"), Some(_)) => Some(uri.to_string()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
