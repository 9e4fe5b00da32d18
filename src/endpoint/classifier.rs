//! Parsing and classification of raw endpoint strings.
//!
//! All functions here are pure: no I/O, no shared state, safe to call from
//! any number of tasks at once.

use std::net::{Ipv4Addr, Ipv6Addr};

use super::error::{EndpointError, EndpointResult};
use super::types::{bracket_if_ipv6, Endpoint, EndpointKind, EndpointScheme};

const ONION_SUFFIX: &str = ".onion";
const LOCAL_HOSTNAMES: &[&str] = &["localhost"];

/// Normalizes a raw endpoint string into an [`Endpoint`].
///
/// Accepts `ssl://host[:port]`, `tcp://host[:port]` (scheme prefix is
/// case-insensitive) or a bare `host[:port]`, which takes `default_scheme`.
/// IPv6 literals may be bracketed; anything after the first `/` of the
/// authority is dropped. Onion hosts are always forced to
/// [`EndpointScheme::Tcp`] since Tor terminates the transport itself.
///
/// # Errors
///
/// Returns an [`EndpointError`] if the input or host is blank, the port is
/// not a number in `1..=65535`, a bracketed IPv6 literal is unterminated, or
/// the scheme prefix is neither `ssl` nor `tcp`.
///
/// # Examples
///
/// ```
/// use noderoute_core::endpoint::{normalize, EndpointKind, EndpointScheme};
///
/// let endpoint = normalize("SSL://Example.com:50002", EndpointScheme::Ssl).unwrap();
/// assert_eq!(endpoint.host(), "example.com");
/// assert_eq!(endpoint.port(), Some(50002));
/// assert_eq!(endpoint.kind(), EndpointKind::Public);
/// assert_eq!(endpoint.url(), "ssl://example.com:50002");
/// ```
pub fn normalize(raw: &str, default_scheme: EndpointScheme) -> EndpointResult<Endpoint> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EndpointError::Blank);
    }

    let (scheme, remainder) = extract_scheme(trimmed, default_scheme)?;
    let authority = remainder.split('/').next().unwrap_or_default();
    let (host, port) = split_host_port(authority)?;

    let host = host.trim().to_lowercase();
    if host.is_empty() {
        return Err(EndpointError::BlankHost);
    }

    let kind = detect_kind(&host);
    let scheme = if kind == EndpointKind::Onion {
        EndpointScheme::Tcp
    } else {
        scheme
    };

    Ok(Endpoint {
        scheme,
        host,
        port,
        kind,
    })
}

/// Classifies a host as onion, local or public.
///
/// First match wins: a `.onion` suffix, then loopback / private /
/// carrier-grade NAT IPv4, `::1`, unique-local (`fc00::/7`) and link-local
/// (`fe80::/10`) IPv6, then everything else is public.
#[must_use]
pub fn detect_kind(host: &str) -> EndpointKind {
    let lower = host.trim().to_lowercase();
    if is_onion_address(&lower) {
        EndpointKind::Onion
    } else if is_local_address(&lower) {
        EndpointKind::Local
    } else {
        EndpointKind::Public
    }
}

/// Whether the host ends in `.onion`, ignoring case.
#[must_use]
pub fn is_onion_address(host: &str) -> bool {
    host.to_lowercase().ends_with(ONION_SUFFIX)
}

/// Builds a canonical URL from separate parts.
///
/// # Errors
///
/// Returns an error if the host is blank or the port is zero.
pub fn build_url(host: &str, port: u16, scheme: EndpointScheme) -> EndpointResult<String> {
    let host = host.trim().to_lowercase();
    if host.is_empty() {
        return Err(EndpointError::BlankHost);
    }
    if port == 0 {
        return Err(EndpointError::PortOutOfRange(0));
    }
    Ok(format!(
        "{}://{}:{port}",
        scheme.protocol(),
        bracket_if_ipv6(&host)
    ))
}

fn extract_scheme(raw: &str, default_scheme: EndpointScheme) -> EndpointResult<(EndpointScheme, &str)> {
    let Some((prefix, rest)) = raw.split_once("://") else {
        return Ok((default_scheme, raw));
    };

    let looks_like_scheme = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !looks_like_scheme {
        return Ok((default_scheme, raw));
    }

    match prefix.to_ascii_lowercase().as_str() {
        "ssl" => Ok((EndpointScheme::Ssl, rest)),
        "tcp" => Ok((EndpointScheme::Tcp, rest)),
        _ => Err(EndpointError::UnsupportedScheme(prefix.to_ascii_lowercase())),
    }
}

fn split_host_port(value: &str) -> EndpointResult<(&str, Option<u16>)> {
    let trimmed = value.trim();

    if let Some(bracketed) = trimmed.strip_prefix('[') {
        let closing = bracketed
            .find(']')
            .ok_or_else(|| EndpointError::InvalidIpv6Literal(value.to_string()))?;
        let host = &bracketed[..closing];
        let rest = &bracketed[closing + 1..];
        if rest.is_empty() {
            return Ok((host, None));
        }
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| EndpointError::InvalidIpv6Literal(value.to_string()))?;
        return Ok((host, parse_port(port)?));
    }

    // An unbracketed IPv6 literal cannot carry a port.
    if trimmed.matches(':').count() > 1 {
        if trimmed.parse::<Ipv6Addr>().is_ok() {
            return Ok((trimmed, None));
        }
        let (_, port) = trimmed.split_once(':').unwrap_or_default();
        return Err(EndpointError::InvalidPort(port.to_string()));
    }

    match trimmed.split_once(':') {
        Some((host, port)) => Ok((host, parse_port(port)?)),
        None => Ok((trimmed, None)),
    }
}

fn parse_port(raw: &str) -> EndpointResult<Option<u16>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value: u32 = raw
        .parse()
        .map_err(|_| EndpointError::InvalidPort(raw.to_string()))?;
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(Some(port)),
        _ => Err(EndpointError::PortOutOfRange(value)),
    }
}

fn is_local_address(host: &str) -> bool {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if LOCAL_HOSTNAMES.contains(&host) {
        return true;
    }
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return is_private_ipv4(ip);
    }
    if let Ok(ip) = host.parse::<Ipv6Addr>() {
        return is_local_ipv6(ip);
    }
    false
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    match first {
        10 | 127 => true,
        172 => (16..=31).contains(&second),
        192 => second == 168,
        100 => (64..=127).contains(&second),
        _ => false,
    }
}

fn is_local_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_host_port_endpoints() {
        let endpoint = normalize("SSL://Example.com:50002", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.scheme(), EndpointScheme::Ssl);
        assert_eq!(endpoint.host(), "example.com");
        assert_eq!(endpoint.port(), Some(50002));
        assert_eq!(endpoint.kind(), EndpointKind::Public);
        assert_eq!(endpoint.url(), "ssl://example.com:50002");
    }

    #[test]
    fn detects_onion_endpoints() {
        let endpoint = normalize("tcp://abc123def.onion:50001", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.kind(), EndpointKind::Onion);
        assert_eq!(endpoint.scheme(), EndpointScheme::Tcp);
        assert_eq!(endpoint.host(), "abc123def.onion");
        assert_eq!(endpoint.url(), "tcp://abc123def.onion:50001");
    }

    #[test]
    fn forces_tcp_for_onion_even_when_ssl_requested() {
        let endpoint = normalize("ssl://ABC.ONION:50002", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.scheme(), EndpointScheme::Tcp);
        assert_eq!(endpoint.url(), "tcp://abc.onion:50002");
    }

    #[test]
    fn bare_host_uses_default_scheme() {
        let endpoint = normalize("electrum.example.org:50001", EndpointScheme::Tcp).unwrap();
        assert_eq!(endpoint.scheme(), EndpointScheme::Tcp);
        assert_eq!(endpoint.url(), "tcp://electrum.example.org:50001");
    }

    #[test]
    fn detects_local_ipv4_addresses() {
        let endpoint = normalize("ssl://192.168.1.10:60002", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.kind(), EndpointKind::Local);
        assert_eq!(detect_kind("192.168.1.10"), EndpointKind::Local);
    }

    #[test]
    fn private_ranges_are_local() {
        for host in [
            "10.0.0.1",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.0.2",
            "100.64.0.1",
            "100.127.255.1",
            "127.0.0.1",
            "localhost",
            "::1",
            "fd12:3456::1",
            "fc00::1",
            "fe80::1",
            "febf::1",
        ] {
            assert_eq!(detect_kind(host), EndpointKind::Local, "{host} should be local");
        }
    }

    #[test]
    fn range_boundaries_are_public() {
        for host in [
            "172.15.0.1",
            "172.32.0.1",
            "100.63.0.1",
            "100.128.0.1",
            "8.8.8.8",
            "fec0::1",
            "2001:db8::1",
            "fdroid.example.com",
        ] {
            assert_eq!(detect_kind(host), EndpointKind::Public, "{host} should be public");
        }
    }

    #[test]
    fn onion_precedes_other_checks() {
        assert_eq!(detect_kind("LOCALHOST.ONION"), EndpointKind::Onion);
    }

    #[test]
    fn parses_bracketed_ipv6_with_port() {
        let endpoint = normalize("tcp://[FE80::1]:50001", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.host(), "fe80::1");
        assert_eq!(endpoint.port(), Some(50001));
        assert_eq!(endpoint.kind(), EndpointKind::Local);
        assert_eq!(endpoint.url(), "tcp://[fe80::1]:50001");
    }

    #[test]
    fn parses_bare_ipv6_without_port() {
        let endpoint = normalize("::1", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.port(), None);
        assert_eq!(endpoint.url(), "ssl://[::1]");
    }

    #[test]
    fn drops_path_suffix() {
        let endpoint = normalize("ssl://example.com:50002/some/path", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.url(), "ssl://example.com:50002");
    }

    #[test]
    fn empty_port_is_absent() {
        let endpoint = normalize("example.com:", EndpointScheme::Ssl).unwrap();
        assert_eq!(endpoint.port(), None);
    }

    #[test]
    fn rejects_blank_input() {
        assert_eq!(normalize("   ", EndpointScheme::Ssl), Err(EndpointError::Blank));
        assert_eq!(normalize("ssl://:50002", EndpointScheme::Ssl), Err(EndpointError::BlankHost));
        assert_eq!(normalize("tcp://[]:1", EndpointScheme::Ssl), Err(EndpointError::BlankHost));
    }

    #[test]
    fn rejects_out_of_range_ports() {
        assert_eq!(
            normalize("example.com:0", EndpointScheme::Ssl),
            Err(EndpointError::PortOutOfRange(0))
        );
        assert_eq!(
            normalize("example.com:65536", EndpointScheme::Ssl),
            Err(EndpointError::PortOutOfRange(65_536))
        );
    }

    #[test]
    fn rejects_non_numeric_ports() {
        assert!(matches!(
            normalize("example.com:abc", EndpointScheme::Ssl),
            Err(EndpointError::InvalidPort(_))
        ));
    }

    #[test]
    fn rejects_unterminated_ipv6() {
        assert!(matches!(
            normalize("[::1:50001", EndpointScheme::Ssl),
            Err(EndpointError::InvalidIpv6Literal(_))
        ));
    }

    #[test]
    fn rejects_unrecognized_schemes() {
        assert_eq!(
            normalize("http://example.com", EndpointScheme::Ssl),
            Err(EndpointError::UnsupportedScheme("http".to_string()))
        );
    }

    #[test]
    fn build_url_brackets_ipv6() {
        assert_eq!(
            build_url(" ::1 ", 50001, EndpointScheme::Tcp).unwrap(),
            "tcp://[::1]:50001"
        );
        assert_eq!(
            build_url("Example.COM", 50002, EndpointScheme::Ssl).unwrap(),
            "ssl://example.com:50002"
        );
    }

    #[test]
    fn build_url_rejects_bad_parts() {
        assert_eq!(build_url("  ", 1, EndpointScheme::Ssl), Err(EndpointError::BlankHost));
        assert_eq!(
            build_url("example.com", 0, EndpointScheme::Ssl),
            Err(EndpointError::PortOutOfRange(0))
        );
    }
}
