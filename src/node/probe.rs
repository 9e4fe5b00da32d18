//! Electrum server reachability probe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::ProbeSettings;
use crate::endpoint::{Endpoint, EndpointScheme};
use crate::sanitize::mask_host;
use crate::tor::{socks, SocksProxyConfig};

use super::error::{ProbeError, ProbeResult};

const CLIENT_NAME: &str = concat!("noderoute/", env!("CARGO_PKG_VERSION"));
const PROTOCOL_VERSION: &str = "1.4";

/// Opens a connection to an Electrum server.
#[async_trait]
pub trait ElectrumProbe: Send + Sync {
    /// Connects to `endpoint`, through `proxy` when given, and returns the
    /// server's version string if it reports one.
    ///
    /// # Errors
    ///
    /// Returns an error only if no connection could be established. A
    /// failed version request yields `Ok(None)`.
    async fn probe(
        &self,
        endpoint: &Endpoint,
        proxy: Option<&SocksProxyConfig>,
    ) -> ProbeResult<Option<String>>;
}

/// Probe speaking Electrum JSON-RPC over TCP, with TLS for `ssl` endpoints.
#[derive(Clone)]
pub struct TcpElectrumProbe {
    settings: ProbeSettings,
    tls: TlsConnector,
}

impl TcpElectrumProbe {
    /// Creates a probe that verifies certificates against the Mozilla root
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::TlsConfig`] if the TLS client cannot be built.
    pub fn new(settings: ProbeSettings) -> ProbeResult<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            tokio_rustls::rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            settings,
            tls: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        proxy: Option<&SocksProxyConfig>,
    ) -> ProbeResult<TcpStream> {
        let attempts = self.settings.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.connect_once(endpoint, proxy).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::debug!(
                        host = %host_label(endpoint),
                        attempt,
                        error = %e,
                        "connection attempt failed"
                    );
                    attempt += 1;
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ProbeError::AllAttemptsFailed {
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect_once(
        &self,
        endpoint: &Endpoint,
        proxy: Option<&SocksProxyConfig>,
    ) -> ProbeResult<TcpStream> {
        let host = endpoint.host();
        let port = endpoint.effective_port();
        let connect = async {
            match proxy {
                Some(proxy) => socks::connect(proxy, host, port).await,
                None => TcpStream::connect((host, port)).await,
            }
        };
        tokio::time::timeout(self.settings.connect_timeout(), connect)
            .await
            .map_err(|_| ProbeError::Timeout(self.settings.connect_timeout_secs))?
            .map_err(ProbeError::Connect)
    }

    async fn handshake(
        &self,
        endpoint: &Endpoint,
        stream: TcpStream,
    ) -> ProbeResult<tokio_rustls::client::TlsStream<TcpStream>> {
        let name = ServerName::try_from(endpoint.host().to_string())
            .map_err(|_| ProbeError::InvalidServerName(endpoint.host().to_string()))?;
        tokio::time::timeout(self.settings.connect_timeout(), self.tls.connect(name, stream))
            .await
            .map_err(|_| ProbeError::Timeout(self.settings.connect_timeout_secs))?
            .map_err(ProbeError::TlsHandshake)
    }

    async fn server_version<S>(&self, endpoint: &Endpoint, stream: S) -> Option<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = request_server_version(stream);
        match tokio::time::timeout(self.settings.request_timeout(), request).await {
            Ok(Ok(version)) => Some(version),
            Ok(Err(e)) => {
                tracing::debug!(host = %host_label(endpoint), error = %e, "server.version failed");
                None
            }
            Err(_) => {
                tracing::debug!(host = %host_label(endpoint), "server.version timed out");
                None
            }
        }
    }
}

impl std::fmt::Debug for TcpElectrumProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpElectrumProbe")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ElectrumProbe for TcpElectrumProbe {
    async fn probe(
        &self,
        endpoint: &Endpoint,
        proxy: Option<&SocksProxyConfig>,
    ) -> ProbeResult<Option<String>> {
        let stream = self.connect(endpoint, proxy).await?;
        let version = match endpoint.scheme() {
            EndpointScheme::Ssl => {
                let tls = self.handshake(endpoint, stream).await?;
                self.server_version(endpoint, tls).await
            }
            EndpointScheme::Tcp => self.server_version(endpoint, stream).await,
        };
        Ok(version)
    }
}

async fn request_server_version<S>(stream: S) -> ProbeResult<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let request = json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "server.version",
        "params": [CLIENT_NAME, PROTOCOL_VERSION],
    });
    let mut line = request.to_string();
    line.push('\n');
    stream
        .get_mut()
        .write_all(line.as_bytes())
        .await
        .map_err(ProbeError::Connect)?;

    let mut response = String::new();
    let read = stream
        .read_line(&mut response)
        .await
        .map_err(ProbeError::Connect)?;
    if read == 0 {
        return Err(ProbeError::Protocol("connection closed".to_string()));
    }
    parse_server_version(&response)
}

/// Extracts the software version from a `server.version` response.
fn parse_server_version(response: &str) -> ProbeResult<String> {
    let value: Value = serde_json::from_str(response.trim())
        .map_err(|e| ProbeError::Protocol(e.to_string()))?;
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(ProbeError::Protocol(error.to_string()));
    }
    let version = match value.get("result") {
        Some(Value::Array(items)) => items.first().and_then(Value::as_str),
        Some(Value::String(version)) => Some(version.as_str()),
        _ => None,
    };
    version
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProbeError::Protocol("missing server version".to_string()))
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(250 * u64::from(attempt.min(8)))
}

fn host_label(endpoint: &Endpoint) -> String {
    mask_host(endpoint.host()).map_or_else(String::new, |masked| masked.label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::normalize;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn settings(attempts: u32) -> ProbeSettings {
        ProbeSettings {
            connect_timeout_secs: 2,
            attempts,
            request_timeout_secs: 2,
        }
    }

    #[test]
    fn parses_array_and_string_results() {
        assert_eq!(
            parse_server_version(r#"{"jsonrpc":"2.0","id":0,"result":["Fulcrum 1.9.1","1.4"]}"#)
                .unwrap(),
            "Fulcrum 1.9.1"
        );
        assert_eq!(
            parse_server_version(r#"{"id":0,"result":"ElectrumX 1.16.0"}"#).unwrap(),
            "ElectrumX 1.16.0"
        );
    }

    #[test]
    fn rejects_error_and_garbage() {
        assert!(parse_server_version(r#"{"id":0,"error":{"code":1,"message":"no"}}"#).is_err());
        assert!(parse_server_version("HTTP/1.1 400 Bad Request").is_err());
        assert!(parse_server_version(r#"{"id":0,"result":[]}"#).is_err());
    }

    #[tokio::test]
    async fn tcp_probe_reads_server_version() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut line = String::new();
            socket.read_line(&mut line).await.unwrap();
            assert!(line.contains("server.version"));
            socket
                .get_mut()
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":[\"Fulcrum 1.9.1\",\"1.4\"]}\n")
                .await
                .unwrap();
        });

        let probe = TcpElectrumProbe::new(settings(1)).unwrap();
        let endpoint = normalize(&format!("tcp://127.0.0.1:{port}"), EndpointScheme::Tcp).unwrap();
        let version = probe.probe(&endpoint, None).await.unwrap();
        assert_eq!(version.as_deref(), Some("Fulcrum 1.9.1"));
    }

    #[tokio::test]
    async fn silent_server_is_success_without_version() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await;
        });

        let probe = TcpElectrumProbe::new(settings(1)).unwrap();
        let endpoint = normalize(&format!("tcp://127.0.0.1:{port}"), EndpointScheme::Tcp).unwrap();
        assert_eq!(probe.probe(&endpoint, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_port_fails_all_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpElectrumProbe::new(settings(2)).unwrap();
        let endpoint = normalize(&format!("tcp://127.0.0.1:{port}"), EndpointScheme::Tcp).unwrap();
        let error = probe.probe(&endpoint, None).await.unwrap_err();
        assert!(matches!(error, ProbeError::AllAttemptsFailed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn tls_handshake_against_plain_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(b"this is not tls\n").await;
        });

        let probe = TcpElectrumProbe::new(settings(1)).unwrap();
        let endpoint = normalize(&format!("ssl://127.0.0.1:{port}"), EndpointScheme::Ssl).unwrap();
        let error = probe.probe(&endpoint, None).await.unwrap_err();
        assert!(matches!(error, ProbeError::TlsHandshake(_)));
    }
}
