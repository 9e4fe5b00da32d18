//! Value types for normalized node endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport scheme of an Electrum endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointScheme {
    /// TLS-wrapped TCP.
    Ssl,
    /// Plain TCP.
    Tcp,
}

impl EndpointScheme {
    /// Returns the wire prefix without the `://` separator.
    #[must_use]
    pub const fn protocol(self) -> &'static str {
        match self {
            Self::Ssl => "ssl",
            Self::Tcp => "tcp",
        }
    }

    /// Default Electrum port for this scheme.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ssl => 50002,
            Self::Tcp => 50001,
        }
    }
}

impl fmt::Display for EndpointScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol())
    }
}

/// Network reachability class of an endpoint host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// A `.onion` host, only reachable through Tor.
    Onion,
    /// Loopback, private or link-local address.
    Local,
    /// Anything else.
    Public,
}

/// A normalized `(scheme, host, port)` tuple.
///
/// Built by [`normalize`](super::normalize). The host is always lower-case
/// and stored without IPv6 brackets; onion hosts always carry
/// [`EndpointScheme::Tcp`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub(super) scheme: EndpointScheme,
    pub(super) host: String,
    pub(super) port: Option<u16>,
    pub(super) kind: EndpointKind,
}

impl Endpoint {
    /// The endpoint scheme.
    #[must_use]
    pub const fn scheme(&self) -> EndpointScheme {
        self.scheme
    }

    /// The lower-cased host, without brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, if one was given.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// The port to dial: the explicit one or the scheme default.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// The reachability class of the host.
    #[must_use]
    pub const fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Whether the host is an onion service.
    #[must_use]
    pub fn is_onion(&self) -> bool {
        self.kind == EndpointKind::Onion
    }

    /// `host[:port]` with IPv6 hosts bracketed.
    #[must_use]
    pub fn host_port(&self) -> String {
        let host = bracket_if_ipv6(&self.host);
        match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    /// Canonical `<scheme>://<host>[:<port>]` string.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme.protocol(), self.host_port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

pub(super) fn bracket_if_ipv6(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: Option<u16>) -> Endpoint {
        Endpoint {
            scheme: EndpointScheme::Ssl,
            host: host.to_string(),
            port,
            kind: EndpointKind::Public,
        }
    }

    #[test]
    fn url_without_port() {
        assert_eq!(endpoint("example.com", None).url(), "ssl://example.com");
    }

    #[test]
    fn url_brackets_ipv6_hosts() {
        assert_eq!(endpoint("::1", Some(50002)).url(), "ssl://[::1]:50002");
    }

    #[test]
    fn effective_port_falls_back_to_scheme_default() {
        assert_eq!(endpoint("example.com", None).effective_port(), 50002);
        assert_eq!(endpoint("example.com", Some(60002)).effective_port(), 60002);
    }

    #[test]
    fn scheme_display_is_protocol() {
        assert_eq!(EndpointScheme::Tcp.to_string(), "tcp");
        assert_eq!(EndpointScheme::Ssl.to_string(), "ssl");
    }
}
