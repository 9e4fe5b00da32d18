//! Minimal SOCKS5 client for reaching hosts through a Tor proxy.
//!
//! Only the no-auth method and the CONNECT command with a domain-name
//! address are supported. Passing the host name to the proxy lets Tor
//! resolve it, so neither onion nor clearnet names leak to local DNS.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::types::SocksProxyConfig;

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Opens a TCP stream to `host:port` through the SOCKS5 proxy.
///
/// # Errors
///
/// Returns an I/O error if the proxy is unreachable or refuses the
/// request. A Tor circuit timeout is reported as
/// [`io::ErrorKind::TimedOut`].
pub async fn connect(proxy: &SocksProxyConfig, host: &str, port: u16) -> io::Result<TcpStream> {
    let host_bytes = host.as_bytes();
    let host_len = u8::try_from(host_bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "hostname too long for SOCKS5"))?;

    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
    negotiate(&mut stream).await?;

    let mut request = Vec::with_capacity(7 + host_bytes.len());
    request.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host_len]);
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid SOCKS5 version in response",
        ));
    }
    if header[1] != 0x00 {
        return Err(reply_error(header[1]));
    }

    // Bound address is unused but must be consumed.
    let remaining = match header[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0]) + 2
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid SOCKS5 address type {other}"),
            ))
        }
    };
    let mut bound = vec![0u8; remaining];
    stream.read_exact(&mut bound).await?;

    Ok(stream)
}

/// Checks that a SOCKS5 proxy is listening and accepts unauthenticated
/// clients.
///
/// # Errors
///
/// Returns an I/O error if the proxy is unreachable or rejects the
/// greeting.
pub async fn probe_proxy(proxy: &SocksProxyConfig) -> io::Result<()> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
    negotiate(&mut stream).await
}

async fn negotiate(stream: &mut TcpStream) -> io::Result<()> {
    stream.write_all(&[VERSION, 0x01, NO_AUTH]).await?;
    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    if response[0] != VERSION || response[1] != NO_AUTH {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "SOCKS5 proxy rejected unauthenticated access",
        ));
    }
    Ok(())
}

fn reply_error(code: u8) -> io::Error {
    let (kind, text) = match code {
        0x01 => (io::ErrorKind::Other, "general SOCKS server failure"),
        0x02 => (io::ErrorKind::PermissionDenied, "connection not allowed by ruleset"),
        0x03 => (io::ErrorKind::Other, "network unreachable"),
        0x04 => (io::ErrorKind::Other, "host unreachable"),
        0x05 => (io::ErrorKind::ConnectionRefused, "connection refused"),
        // Tor answers a circuit timeout with TTL expired.
        0x06 => (io::ErrorKind::TimedOut, "connection timed out"),
        0x07 => (io::ErrorKind::Unsupported, "command not supported"),
        0x08 => (io::ErrorKind::Unsupported, "address type not supported"),
        _ => (io::ErrorKind::Other, "unknown SOCKS5 error"),
    };
    io::Error::new(kind, format!("SOCKS5 connect failed: {text} (code {code})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn ttl_expired_maps_to_timeout() {
        assert_eq!(reply_error(0x06).kind(), io::ErrorKind::TimedOut);
        assert_eq!(reply_error(0x05).kind(), io::ErrorKind::ConnectionRefused);
        assert!(reply_error(0x04).to_string().contains("host unreachable"));
    }

    #[tokio::test]
    async fn connect_sends_domain_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            socket.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [0x05, 0x01, 0x00]);
            socket.write_all(&[0x05, 0x00]).await.unwrap();

            let mut head = [0u8; 5];
            socket.read_exact(&mut head).await.unwrap();
            assert_eq!(&head[..4], &[0x05, 0x01, 0x00, 0x03]);
            let mut rest = vec![0u8; usize::from(head[4]) + 2];
            socket.read_exact(&mut rest).await.unwrap();
            let host = String::from_utf8(rest[..rest.len() - 2].to_vec()).unwrap();
            let port = u16::from_be_bytes([rest[rest.len() - 2], rest[rest.len() - 1]]);

            socket
                .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0])
                .await
                .unwrap();
            (host, port)
        });

        let proxy = SocksProxyConfig::new("127.0.0.1", port);
        connect(&proxy, "example.onion", 50001).await.unwrap();
        let (host, target_port) = server.await.unwrap();
        assert_eq!(host, "example.onion");
        assert_eq!(target_port, 50001);
    }

    #[tokio::test]
    async fn rejected_greeting_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            socket.read_exact(&mut greeting).await.unwrap();
            socket.write_all(&[0x05, 0xFF]).await.unwrap();
        });

        let proxy = SocksProxyConfig::new("127.0.0.1", port);
        let error = probe_proxy(&proxy).await.unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
    }
}
