//! Node connection testing.
//!
//! A test normalizes the node's endpoint, decides whether it must go
//! through Tor, probes it and turns any network failure into a
//! [`ConnectionTestResult::Failure`] with a readable reason. Only a
//! malformed endpoint or cancellation is returned as an error.

use std::error::Error;
use std::io;
use std::sync::Arc;

use tokio_rustls::rustls;

use crate::config::TransportPolicy;
use crate::endpoint::{build_url, normalize, EndpointError, EndpointScheme};
use crate::sanitize::{mask_host, root_cause, sanitize_message};
use crate::tor::TorManager;

use super::error::{NodeError, NodeResult, ProbeError};
use super::probe::ElectrumProbe;
use super::provider::resolve_transport;
use super::types::{BitcoinNetwork, ConnectionTestResult, CustomNode};

const TOR_TIMEOUT_HINT: &str = "Tor connection timed out. Retry shortly or pick another node.";
const TOR_TLS_HINT: &str = "TLS handshake failed while connecting through Tor. \
     Verify the node's certificate or try a different endpoint.";
const DIRECT_TIMEOUT_HINT: &str =
    "All connection attempts failed or timed out. Retry shortly or pick another node.";
const DIRECT_TLS_HINT: &str =
    "TLS handshake failed. Verify the node's certificate or try a different endpoint.";
const UNREACHABLE: &str = "Unable to reach node";

/// Probes nodes, routing through Tor when the endpoint requires it.
pub struct ConnectionTester {
    tor: Arc<TorManager>,
    probe: Arc<dyn ElectrumProbe>,
    policy: TransportPolicy,
}

impl ConnectionTester {
    /// Creates a tester.
    #[must_use]
    pub fn new(
        tor: Arc<TorManager>,
        probe: Arc<dyn ElectrumProbe>,
        policy: TransportPolicy,
    ) -> Self {
        Self { tor, probe, policy }
    }

    /// Tests `node`.
    ///
    /// Tor-routed probes run inside [`TorManager::with_tor_proxy`], so Tor
    /// stays up for the duration of the probe.
    ///
    /// # Errors
    ///
    /// - [`NodeError::InvalidEndpoint`] if the endpoint is malformed
    /// - [`NodeError::Cancelled`] if the Tor manager shut down mid-test
    pub async fn test(&self, node: &CustomNode) -> NodeResult<ConnectionTestResult> {
        let endpoint = normalize(&node.endpoint, EndpointScheme::Ssl)?;
        let transport = resolve_transport(endpoint.kind(), node.preferred_transport, self.policy);
        let via_tor = transport.requires_tor();
        let url = endpoint.url();

        let outcome = if via_tor {
            let target = &endpoint;
            let probe = &self.probe;
            let proxied = self
                .tor
                .with_tor_proxy(move |proxy| async move { probe.probe(target, Some(&proxy)).await })
                .await;
            match proxied {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancellation() => return Err(NodeError::Cancelled),
                Err(e) => {
                    tracing::warn!(error = %e, "Tor unavailable for connection test");
                    return Ok(ConnectionTestResult::Failure {
                        reason: format!("{} (endpoint: {url})", e.reason()),
                    });
                }
            }
        } else {
            self.probe.probe(&endpoint, None).await
        };

        Ok(match outcome {
            Ok(server_version) => {
                tracing::debug!(
                    host = %mask_host(endpoint.host()).map(|m| m.label).unwrap_or_default(),
                    %transport,
                    "node reachable"
                );
                ConnectionTestResult::Success { server_version }
            }
            Err(e) => {
                tracing::warn!(
                    host = %mask_host(endpoint.host()).map(|m| m.label).unwrap_or_default(),
                    %transport,
                    error = %sanitize_message(&e.to_string(), Some(endpoint.host())),
                    "node connection test failed"
                );
                ConnectionTestResult::Failure {
                    reason: describe_failure(&e, via_tor, &url),
                }
            }
        })
    }

    /// Tests an `ssl://host:port` endpoint.
    ///
    /// # Errors
    ///
    /// See [`test`](Self::test); a blank host or port 0 is
    /// [`NodeError::InvalidEndpoint`].
    pub async fn test_host_port(&self, host: &str, port: u16) -> NodeResult<ConnectionTestResult> {
        let host = host.trim();
        let url = build_url(host, port, EndpointScheme::Ssl)?;
        let node = CustomNode::new(
            format!("temp-host-{host}-{port}"),
            url,
            BitcoinNetwork::default(),
        );
        self.test(&node).await
    }

    /// Tests a `tcp://` onion endpoint. A leading `tcp://` or `ssl://` is
    /// ignored.
    ///
    /// # Errors
    ///
    /// See [`test`](Self::test); a blank address is
    /// [`NodeError::InvalidEndpoint`].
    pub async fn test_onion(&self, onion: &str) -> NodeResult<ConnectionTestResult> {
        let trimmed = onion.trim();
        let bare = trimmed
            .strip_prefix("tcp://")
            .or_else(|| trimmed.strip_prefix("ssl://"))
            .unwrap_or(trimmed);
        if bare.is_empty() {
            return Err(EndpointError::Blank.into());
        }
        let node = CustomNode::new(
            format!("temp-onion-{bare}"),
            format!("tcp://{bare}"),
            BitcoinNetwork::default(),
        );
        self.test(&node).await
    }
}

impl std::fmt::Debug for ConnectionTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTester")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Timeout,
    Tls,
    Other,
}

/// Builds the user-facing reason for a failed probe.
///
/// Timeouts and exhausted retries get a retry hint, TLS failures a
/// certificate hint; anything else shows the root cause. The endpoint is
/// appended.
#[must_use]
pub fn describe_failure(error: &(dyn Error + 'static), via_tor: bool, endpoint: &str) -> String {
    let base = match (classify(error), via_tor) {
        (FailureKind::Timeout, true) => TOR_TIMEOUT_HINT.to_string(),
        (FailureKind::Timeout, false) => DIRECT_TIMEOUT_HINT.to_string(),
        (FailureKind::Tls, true) => TOR_TLS_HINT.to_string(),
        (FailureKind::Tls, false) => DIRECT_TLS_HINT.to_string(),
        (FailureKind::Other, _) => {
            let message = root_cause(error).to_string();
            let message = message.trim();
            if message.is_empty() {
                UNREACHABLE.to_string()
            } else {
                message.to_string()
            }
        }
    };
    format!("{base} (endpoint: {endpoint})")
}

fn classify(error: &(dyn Error + 'static)) -> FailureKind {
    let mut timed_out = false;
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(probe) = e.downcast_ref::<ProbeError>() {
            match probe {
                ProbeError::TlsHandshake(_) | ProbeError::TlsConfig(_) => return FailureKind::Tls,
                ProbeError::Timeout(_) | ProbeError::AllAttemptsFailed { .. } => timed_out = true,
                ProbeError::Connect(_)
                | ProbeError::InvalidServerName(_)
                | ProbeError::Protocol(_) => {}
            }
        }
        if let Some(io_error) = e.downcast_ref::<io::Error>() {
            // io::Error::source skips the wrapped error, so inspect it here.
            if io_error
                .get_ref()
                .is_some_and(|inner| inner.is::<rustls::Error>())
            {
                return FailureKind::Tls;
            }
            if io_error.kind() == io::ErrorKind::TimedOut {
                timed_out = true;
            }
        }
        if e.is::<rustls::Error>() {
            return FailureKind::Tls;
        }
        current = e.source();
    }
    if timed_out {
        FailureKind::Timeout
    } else {
        FailureKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "ssl://node.example:50002";

    #[test]
    fn exhausted_attempts_via_tor() {
        let error = ProbeError::AllAttemptsFailed {
            attempts: 5,
            last: Box::new(ProbeError::Connect(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            ))),
        };
        assert_eq!(
            describe_failure(&error, true, URL),
            format!("{TOR_TIMEOUT_HINT} (endpoint: {URL})")
        );
    }

    #[test]
    fn tls_failure_direct() {
        let error = ProbeError::TlsHandshake(io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::Expired),
        ));
        assert_eq!(
            describe_failure(&error, false, URL),
            format!("{DIRECT_TLS_HINT} (endpoint: {URL})")
        );
    }

    #[test]
    fn rustls_error_inside_plain_io_error_is_tls() {
        let error = ProbeError::Connect(io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer),
        ));
        assert_eq!(classify(&error), FailureKind::Tls);
    }

    #[test]
    fn socks_timeout_counts_as_timeout() {
        let error = ProbeError::Connect(io::Error::new(
            io::ErrorKind::TimedOut,
            "SOCKS5 connect failed: connection timed out (code 6)",
        ));
        assert_eq!(classify(&error), FailureKind::Timeout);
    }

    #[test]
    fn other_errors_show_root_cause() {
        let error = ProbeError::Connect(io::Error::other("network is unreachable"));
        assert_eq!(
            describe_failure(&error, true, URL),
            format!("network is unreachable (endpoint: {URL})")
        );
    }

    #[test]
    fn blank_root_cause_uses_generic_reason() {
        let error = ProbeError::Connect(io::Error::other(""));
        assert_eq!(
            describe_failure(&error, false, URL),
            format!("{UNREACHABLE} (endpoint: {URL})")
        );
    }
}
