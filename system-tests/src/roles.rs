// system-tests/src/roles.rs
// ============================================================================
// Module: Server Roles
// Description: The five helper servers a proxy suite runs.
// Purpose: Give every helper a stable label and a fixed port offset.
// Dependencies: serde
// ============================================================================

//! Helper server roles and their port offsets from the suite base port.

use std::fmt;

use serde::Serialize;

/// Helper server launched for a proxy suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerRole {
    /// Plain HTTP origin serving the suite directory.
    OriginHttp,
    /// HTTPS origin serving the suite directory.
    OriginHttps,
    /// Forwarding proxy without `CONNECT` support.
    DumbProxy,
    /// Forwarding proxy with `CONNECT` tunnelling.
    ConnectProxy,
    /// TLS-intercepting proxy.
    InterceptProxy,
}

impl ServerRole {
    /// All roles in port-offset order.
    pub const ALL: [Self; 5] = [
        Self::OriginHttp,
        Self::OriginHttps,
        Self::DumbProxy,
        Self::ConnectProxy,
        Self::InterceptProxy,
    ];

    /// Returns the stable label used in logs and artifacts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OriginHttp => "origin_http",
            Self::OriginHttps => "origin_https",
            Self::DumbProxy => "dumb_proxy",
            Self::ConnectProxy => "connect_proxy",
            Self::InterceptProxy => "intercept_proxy",
        }
    }

    /// Returns the offset of this role from the suite base port.
    #[must_use]
    pub const fn port_offset(self) -> u16 {
        match self {
            Self::OriginHttp => 0,
            Self::OriginHttps => 1,
            Self::DumbProxy => 2,
            Self::ConnectProxy => 3,
            Self::InterceptProxy => 4,
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
