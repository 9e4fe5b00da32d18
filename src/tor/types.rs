//! Types for Tor status and runtime state.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default SOCKS host exposed by a local Tor client.
pub const DEFAULT_SOCKS_HOST: &str = "127.0.0.1";

/// Default SOCKS port exposed by a local Tor client.
pub const DEFAULT_SOCKS_PORT: u16 = 9050;

/// Default time allowed for Tor to bootstrap before waiters give up.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 4 * 60;

static BOOTSTRAP_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Bootstrapped\s+(\d+)%").ok());

/// Local SOCKS endpoint through which traffic enters Tor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocksProxyConfig {
    /// Proxy host, usually a loopback address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl SocksProxyConfig {
    /// Creates a proxy config.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for SocksProxyConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT)
    }
}

impl fmt::Display for SocksProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Configuration handed to the Tor runtime on start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorConfig {
    /// SOCKS endpoint the runtime is expected to expose.
    pub socks_proxy: SocksProxyConfig,
    /// Seconds a caller of `await_proxy` waits for bootstrap.
    pub start_timeout_secs: u64,
    /// Directory holding the runtime's persistent state, if any.
    pub data_dir: Option<std::path::PathBuf>,
}

impl TorConfig {
    /// Bootstrap timeout as a [`Duration`].
    #[must_use]
    pub const fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_proxy: SocksProxyConfig::default(),
            start_timeout_secs: DEFAULT_START_TIMEOUT_SECS,
            data_dir: None,
        }
    }
}

/// Observable Tor state.
///
/// Exactly one variant is active at a time. Transitions are driven only by
/// the runtime's reported state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TorStatus {
    /// Not running.
    #[default]
    Stopped,

    /// Bootstrapping.
    Connecting {
        /// Bootstrap progress, 0-100.
        progress: u8,
        /// Latest runtime log line.
        message: Option<String>,
    },

    /// Bootstrapped; the proxy is usable.
    Running {
        /// The SOCKS endpoint to tunnel through.
        proxy: SocksProxyConfig,
    },

    /// The runtime reported a failure.
    Error {
        /// Runtime error text.
        message: String,
    },
}

impl TorStatus {
    /// Returns the proxy if Tor is running.
    #[must_use]
    pub const fn proxy(&self) -> Option<&SocksProxyConfig> {
        match self {
            Self::Running { proxy } => Some(proxy),
            Self::Stopped | Self::Connecting { .. } | Self::Error { .. } => None,
        }
    }

    /// Whether Tor is bootstrapped.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Whether Tor is running or on its way there.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Connecting { .. })
    }

    /// Maps a runtime snapshot one-to-one onto a status.
    ///
    /// `start_pending` marks that a start was requested and not yet
    /// resolved; an idle runtime only counts as connecting in that case.
    /// `fallback_proxy` is used when a connected runtime did not report
    /// its proxy address.
    #[must_use]
    pub fn from_runtime(
        snapshot: &RuntimeSnapshot,
        start_pending: bool,
        fallback_proxy: &SocksProxyConfig,
    ) -> Self {
        match snapshot.state {
            RuntimeState::Idle if !start_pending => Self::Stopped,
            RuntimeState::Idle | RuntimeState::Connecting => Self::Connecting {
                progress: snapshot.effective_progress(),
                message: snapshot.log_line(),
            },
            RuntimeState::Connected => Self::Running {
                proxy: snapshot
                    .proxy
                    .clone()
                    .unwrap_or_else(|| fallback_proxy.clone()),
            },
            RuntimeState::Disconnected => Self::Stopped,
            RuntimeState::Error => Self::Error {
                message: snapshot
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .or_else(|| snapshot.log_line())
                    .unwrap_or_else(|| "Tor error".to_string()),
            },
        }
    }
}

/// Connection state reported by the Tor runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeState {
    /// Created, nothing requested yet.
    #[default]
    Idle,
    /// Bootstrapping circuits.
    Connecting,
    /// Proxy is usable.
    Connected,
    /// Shut down.
    Disconnected,
    /// Failed to start or crashed.
    Error,
}

/// Everything the runtime reports in one update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeSnapshot {
    /// Connection state.
    pub state: RuntimeState,
    /// Proxy address once connected.
    pub proxy: Option<SocksProxyConfig>,
    /// Bootstrap progress, 0-100.
    pub progress: u8,
    /// Latest diagnostic log line.
    pub latest_log: String,
    /// Error text when `state` is [`RuntimeState::Error`].
    pub error: Option<String>,
}

impl RuntimeSnapshot {
    /// Reported progress, or the value parsed from the latest log line when
    /// the runtime reported none.
    #[must_use]
    pub fn effective_progress(&self) -> u8 {
        if self.progress > 0 {
            return self.progress.min(100);
        }
        bootstrap_progress(&self.latest_log).unwrap_or(0)
    }

    fn log_line(&self) -> Option<String> {
        let line = self.latest_log.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Extracts the percentage from a `Bootstrapped N%` log line.
#[must_use]
pub fn bootstrap_progress(log: &str) -> Option<u8> {
    let regex = BOOTSTRAP_REGEX.as_ref()?;
    let value: u32 = regex.captures(log)?.get(1)?.as_str().parse().ok()?;
    u8::try_from(value.min(100)).ok()
}
