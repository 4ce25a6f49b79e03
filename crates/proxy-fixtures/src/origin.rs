// crates/proxy-fixtures/src/origin.rs
// ============================================================================
// Module: Origin File Server
// Description: Static file server for the download targets.
// Purpose: Serve the working directory over HTTP or HTTPS on a fixed port.
// Dependencies: hyper, tokio
// ============================================================================

//! ## Overview
//! The origin server answers `GET` and `HEAD` for regular files below its
//! root. Paths containing parent or absolute components are refused so the
//! server cannot be steered outside the served directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Method;
use hyper::Request;
use hyper::Response;
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use hyper::header::CONTENT_TYPE;
use hyper::header::HeaderValue;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::error::FixtureError;
use crate::log::FixtureEvent;
use crate::serve::FixtureResponse;
use crate::serve::bind_loopback;
use crate::serve::serve;
use crate::serve::text_response;
use crate::tls::TlsIdentity;
use crate::tls::tls_acceptor;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Origin server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginConfig {
    /// Loopback port to listen on.
    pub port: u16,
    /// Directory whose files are served.
    pub root: PathBuf,
    /// TLS identity; `None` serves plain HTTP.
    pub tls: Option<TlsIdentity>,
}

// ============================================================================
// SECTION: Entry Points
// ============================================================================

/// Binds the configured port and serves files until the process exits.
///
/// # Errors
///
/// Returns an error when the TLS identity cannot be loaded or the port cannot
/// be bound.
pub async fn run_origin(config: OriginConfig) -> Result<(), FixtureError> {
    let tls = config.tls.as_ref().map(tls_acceptor).transpose()?;
    let listener = bind_loopback(config.port).await?;
    serve_origin(listener, config.root, tls).await;
    Ok(())
}

/// Serves files from `root` on an already bound listener.
pub async fn serve_origin(listener: TcpListener, root: PathBuf, tls: Option<TlsAcceptor>) {
    let server = if tls.is_some() { "origin_https" } else { "origin_http" };
    let port = listener.local_addr().map(|addr| addr.port()).unwrap_or_default();
    FixtureEvent::new(server, "listening")
        .detail(format!("127.0.0.1:{port} root={}", root.display()))
        .emit();
    let root = Arc::new(root);
    serve(listener, tls, server, move |request| {
        let root = Arc::clone(&root);
        async move { serve_file(&root, server, request).await }
    })
    .await;
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Answers one request from the served directory.
async fn serve_file(
    root: &Path,
    server: &'static str,
    request: Request<Incoming>,
) -> FixtureResponse {
    let method = request.method().clone();
    let target = request.uri().path().to_string();
    let response = if method != Method::GET && method != Method::HEAD {
        text_response(StatusCode::METHOD_NOT_ALLOWED, "only GET and HEAD are served\n")
    } else {
        match resolve_request_path(&target) {
            None => text_response(StatusCode::NOT_FOUND, "not found\n"),
            Some(relative) => match tokio::fs::read(root.join(relative)).await {
                Ok(bytes) => file_response(bytes, method == Method::HEAD),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    text_response(StatusCode::NOT_FOUND, "not found\n")
                }
                Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n")),
            },
        }
    };
    FixtureEvent::new(server, "request")
        .request(method.as_str(), target)
        .status(response.status().as_u16())
        .emit();
    response
}

/// Builds a response carrying file contents.
fn file_response(bytes: Vec<u8>, head_only: bool) -> FixtureResponse {
    let length = bytes.len();
    let body = if head_only { Bytes::new() } else { Bytes::from(bytes) };
    let mut response = Response::new(Full::new(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    if head_only {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

/// Maps a request path onto a relative file path below the root.
///
/// Returns `None` for the root itself and for paths that would escape it.
#[must_use]
pub fn resolve_request_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let candidate = Path::new(trimmed);
    let mut relative = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if relative.as_os_str().is_empty() { None } else { Some(relative) }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::resolve_request_path;

    #[test]
    fn plain_names_resolve() {
        assert_eq!(resolve_request_path("/target_abc.txt"), Some(PathBuf::from("target_abc.txt")));
        assert_eq!(resolve_request_path("/./a/b"), Some(PathBuf::from("a/b")));
    }

    #[test]
    fn escapes_and_root_are_refused() {
        assert_eq!(resolve_request_path("/"), None);
        assert_eq!(resolve_request_path("/../etc/passwd"), None);
        assert_eq!(resolve_request_path("/a/../../b"), None);
    }
}
