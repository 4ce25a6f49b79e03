// crates/proxy-fixtures/src/forward.rs
// ============================================================================
// Module: Upstream Forwarder
// Description: Re-issues proxied requests to their origin with reqwest.
// Purpose: Share forwarding between absolute-form proxying and interception.
// Dependencies: reqwest, hyper, http-body-util
// ============================================================================

//! ## Overview
//! The forwarder never consults system proxy settings and never follows
//! redirects. Hop-by-hop headers are stripped before forwarding. Upstream TLS
//! trusts the built-in roots plus an optional extra CA file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use reqwest::Certificate;
use reqwest::Client;
use reqwest::redirect::Policy;

use crate::error::FixtureError;
use crate::log::FixtureEvent;
use crate::serve::FixtureResponse;
use crate::serve::text_response;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP_HEADERS: [&str; 10] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Upstream request timeout.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Forwarder
// ============================================================================

/// Upstream HTTP client used by the proxies.
#[derive(Debug, Clone)]
pub struct Forwarder {
    /// Shared async client.
    client: Client,
}

impl Forwarder {
    /// Builds a forwarder, optionally trusting an extra CA for upstream TLS.
    ///
    /// # Errors
    ///
    /// Returns an error when the CA file is unreadable or the client cannot be
    /// built.
    pub fn new(upstream_ca: Option<&Path>) -> Result<Self, FixtureError> {
        let mut builder = Client::builder()
            .no_proxy()
            .redirect(Policy::none())
            .timeout(UPSTREAM_TIMEOUT);
        if let Some(path) = upstream_ca {
            let pem = std::fs::read(path)
                .map_err(|err| FixtureError::Tls(format!("{}: {err}", path.display())))?;
            let certificates = Certificate::from_pem_bundle(&pem)
                .map_err(|err| FixtureError::Tls(format!("{}: {err}", path.display())))?;
            if certificates.is_empty() {
                return Err(FixtureError::Tls(format!(
                    "{}: no certificates found",
                    path.display()
                )));
            }
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
        let client = builder.build().map_err(|err| FixtureError::Client(err.to_string()))?;
        Ok(Self {
            client,
        })
    }

    /// Forwards `request` to `target` and relays the upstream response.
    ///
    /// Upstream failures become `502 Bad Gateway`.
    pub async fn forward(
        &self,
        server: &'static str,
        request: Request<Incoming>,
        target: String,
    ) -> FixtureResponse {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                return upstream_failure(server, parts.method.as_str(), &target, &err.to_string());
            }
        };
        let mut headers = parts.headers;
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(name);
        }
        let outbound = self.client.request(parts.method.clone(), target.as_str()).headers(headers);
        let outbound = if body.is_empty() { outbound } else { outbound.body(body) };

        let upstream = match outbound.send().await {
            Ok(upstream) => upstream,
            Err(err) => {
                return upstream_failure(server, parts.method.as_str(), &target, &render_chain(&err));
            }
        };
        let status = upstream.status();
        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        let bytes = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return upstream_failure(server, parts.method.as_str(), &target, &render_chain(&err));
            }
        };

        FixtureEvent::new(server, "forwarded")
            .request(parts.method.as_str(), target)
            .status(status.as_u16())
            .emit();
        relay_response(status, content_type, bytes)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Logs an upstream failure and answers `502`.
fn upstream_failure(
    server: &'static str,
    method: &str,
    target: &str,
    detail: &str,
) -> FixtureResponse {
    FixtureEvent::new(server, "upstream_failed")
        .request(method, target)
        .status(StatusCode::BAD_GATEWAY.as_u16())
        .detail(detail)
        .emit();
    text_response(StatusCode::BAD_GATEWAY, format!("upstream request failed: {detail}\n"))
}

/// Builds the relayed response.
fn relay_response(
    status: StatusCode,
    content_type: Option<hyper::header::HeaderValue>,
    bytes: Bytes,
) -> FixtureResponse {
    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = status;
    if let Some(value) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

/// Renders an error with its sources.
fn render_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(node) = current {
        rendered.push_str(": ");
        rendered.push_str(&node.to_string());
        current = node.source();
    }
    rendered
}
