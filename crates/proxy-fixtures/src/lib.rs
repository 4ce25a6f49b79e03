// crates/proxy-fixtures/src/lib.rs
// ============================================================================
// Module: Proxy Fixtures
// Description: Loopback origin server and proxy servers for download tests.
// Purpose: Provide the helper servers that proxy topology suites launch.
// Dependencies: hyper, reqwest, rustls, tokio, tokio-rustls
// ============================================================================

//! ## Overview
//! This crate implements the servers a proxy topology suite runs as child
//! processes:
//! - an origin file server that serves a directory over HTTP or HTTPS;
//! - a dumb forwarding proxy that rejects `CONNECT`;
//! - a forwarding proxy that also tunnels `CONNECT`;
//! - an intercepting proxy that terminates TLS for both the client leg and
//!   every tunnel, then re-originates requests upstream.
//!
//! Every server binds `127.0.0.1` and logs one JSON line per request to
//! stderr through [`log::FixtureEvent`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod forward;
pub mod log;
pub mod origin;
pub mod proxy;
pub mod serve;
pub mod tls;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::FixtureError;
pub use origin::OriginConfig;
pub use origin::run_origin;
pub use proxy::ProxyConfig;
pub use proxy::ProxyMode;
pub use proxy::run_proxy;
pub use tls::TlsIdentity;
