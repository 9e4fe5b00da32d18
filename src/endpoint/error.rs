//! Error types for endpoint parsing.
//!
//! Every variant is a precondition violation on the raw endpoint string and
//! is reported at the call site rather than defaulted.

use thiserror::Error;

/// Errors that can occur while normalizing an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The input was empty or only whitespace.
    #[error("Endpoint cannot be blank")]
    Blank,

    /// The host portion was empty.
    #[error("Host cannot be blank")]
    BlankHost,

    /// The port could not be parsed as a number.
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// The port was parsed but is outside 1..=65535.
    #[error("Port {0} out of range")]
    PortOutOfRange(u32),

    /// A bracketed IPv6 literal was not closed.
    #[error("Invalid IPv6 literal: {0}")]
    InvalidIpv6Literal(String),

    /// The endpoint used a scheme other than `ssl://` or `tcp://`.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

/// Result type for endpoint operations.
pub type EndpointResult<T> = Result<T, EndpointError>;
