//! Error types for node resolution and connection probing.

use std::io;

use thiserror::Error;

use crate::endpoint::EndpointError;

/// Errors from node resolution and testing.
///
/// Network failures during a connection test are not errors; they are
/// reported as [`ConnectionTestResult::Failure`](super::ConnectionTestResult).
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node's endpoint string is malformed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),

    /// The operation was cancelled because its collaborator shut down.
    #[error("Operation cancelled")]
    Cancelled,

    /// The configuration repository rejected an update.
    #[error("Node configuration update failed: {0}")]
    Repository(String),

    /// The connection probe could not be set up.
    #[error("Probe setup failed: {0}")]
    ProbeSetup(#[from] ProbeError),
}

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors raised while probing an Electrum server.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A single connection attempt failed.
    #[error("Connection failed: {0}")]
    Connect(#[source] io::Error),

    /// A single connection attempt exceeded the connect timeout.
    #[error("Connection attempt timed out after {0}s")]
    Timeout(u64),

    /// Every connection attempt failed; carries the last failure.
    #[error("All {attempts} connection attempts failed")]
    AllAttemptsFailed {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last: Box<ProbeError>,
    },

    /// The TLS handshake with the server failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] io::Error),

    /// The host is not usable as a TLS server name.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// The server answered with something that is not Electrum JSON-RPC.
    #[error("Unexpected server response: {0}")]
    Protocol(String),

    /// The TLS client could not be configured.
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] tokio_rustls::rustls::Error),
}

impl ProbeError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

/// Result type for probes.
pub type ProbeResult<T> = Result<T, ProbeError>;
