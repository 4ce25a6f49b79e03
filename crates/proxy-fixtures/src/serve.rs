// crates/proxy-fixtures/src/serve.rs
// ============================================================================
// Module: Fixture Serve Loop
// Description: Accept loop and HTTP/1.1 connection driver for fixture servers.
// Purpose: Share listener, TLS and upgrade plumbing across origin and proxies.
// Dependencies: hyper, hyper-util, tokio, tokio-rustls
// ============================================================================

//! ## Overview
//! [`serve`] accepts loopback connections forever, optionally wraps each one
//! in TLS, and drives it with hyper's HTTP/1.1 server. Upgrades are enabled so
//! proxy handlers can take over the connection after answering `CONNECT`.
//! Handlers are infallible: every failure is mapped to a response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::future::Future;
use std::net::Ipv4Addr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::error::FixtureError;
use crate::log::FixtureEvent;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Response type produced by every fixture handler.
pub type FixtureResponse = Response<Full<Bytes>>;

// ============================================================================
// SECTION: Listener
// ============================================================================

/// Binds `127.0.0.1:port`.
///
/// # Errors
///
/// Returns [`FixtureError::Bind`] when the port is unavailable.
pub async fn bind_loopback(port: u16) -> Result<TcpListener, FixtureError> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.map_err(|source| FixtureError::Bind {
        port,
        source,
    })
}

/// Serves connections from `listener` until the process exits.
///
/// Accept failures are logged and the loop continues.
pub async fn serve<H, F>(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    server: &'static str,
    handler: H,
) where
    H: Fn(Request<Incoming>) -> F + Clone + Send + Sync + 'static,
    F: Future<Output = FixtureResponse> + Send + 'static,
{
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                FixtureEvent::new(server, "accept_failed").detail(err.to_string()).emit();
                continue;
            }
        };
        let handler = handler.clone();
        let tls = tls.clone();
        tokio::spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(TokioIo::new(stream), server, handler).await,
                    Err(err) => FixtureEvent::new(server, "tls_handshake_failed")
                        .detail(format!("{peer}: {err}"))
                        .emit(),
                },
                None => serve_connection(TokioIo::new(stream), server, handler).await,
            }
        });
    }
}

/// Drives one HTTP/1.1 connection with upgrades enabled.
pub async fn serve_connection<I, H, F>(io: I, server: &'static str, handler: H)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    H: Fn(Request<Incoming>) -> F + Send + Sync + 'static,
    F: Future<Output = FixtureResponse> + Send + 'static,
{
    let service = service_fn(move |request: Request<Incoming>| {
        let response = handler(request);
        async move { Ok::<_, Infallible>(response.await) }
    });
    if let Err(err) = http1::Builder::new().serve_connection(io, service).with_upgrades().await {
        FixtureEvent::new(server, "connection_error").detail(err.to_string()).emit();
    }
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Builds a plain-text response.
#[must_use]
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> FixtureResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Builds a response with an empty body.
#[must_use]
pub fn empty_response(status: StatusCode) -> FixtureResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
