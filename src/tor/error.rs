//! Error types for Tor management.

use thiserror::Error;

/// Errors that can occur while starting, stopping or waiting on Tor.
#[derive(Debug, Error)]
pub enum TorError {
    /// The runtime reported an error while bootstrapping.
    #[error("Tor unavailable: {0}")]
    Unavailable(String),

    /// Tor did not reach the running state within the configured timeout.
    #[error("Tor bootstrap timed out after {0}s")]
    BootstrapTimeout(u64),

    /// Tor was stopped while a caller was waiting for it.
    #[error("Tor stopped before it finished connecting")]
    StoppedBeforeReady,

    /// A runtime command could not be executed.
    #[error("Tor runtime command failed: {0}")]
    Runtime(String),

    /// I/O error while touching the runtime's persistent state.
    #[error("Tor state I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The status stream ended because the manager was shut down.
    #[error("Tor manager shut down")]
    Closed,
}

impl TorError {
    /// Whether this error means the caller was cancelled rather than Tor
    /// failing.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Text suitable for a user-facing failure reason.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Unavailable(message) | Self::Runtime(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for Tor operations.
pub type TorResult<T> = Result<T, TorError>;
