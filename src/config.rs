//! Router configuration.
//!
//! Settings are plain serde structs so the embedding app can store them
//! however it likes. Environment variables override the stored values:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `NODEROUTE_SOCKS_PROXY` | `host:port` of the Tor SOCKS proxy |
//! | `NODEROUTE_TOR_START_TIMEOUT_SECS` | bootstrap timeout |
//! | `NODEROUTE_DIRECT_PUBLIC=1` | route public nodes directly ([`TransportPolicy::OnionOnly`]) |
//! | `NODEROUTE_PROBE_ATTEMPTS` | connection attempts per probe |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tor::{SocksProxyConfig, TorConfig};

/// Which non-local endpoints go through Tor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPolicy {
    /// Every public endpoint is routed through Tor.
    #[default]
    AllRemote,
    /// Only onion endpoints use Tor; public endpoints connect directly.
    OnionOnly,
}

impl std::fmt::Display for TransportPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllRemote => write!(f, "all-remote"),
            Self::OnionOnly => write!(f, "onion-only"),
        }
    }
}

/// Connection probe tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Per-attempt connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Connection attempts before giving up.
    pub attempts: u32,
    /// Timeout for the server metadata request, in seconds.
    pub request_timeout_secs: u64,
}

impl ProbeSettings {
    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Metadata request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            attempts: 5,
            request_timeout_secs: 10,
        }
    }
}

/// Everything the router needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Tor runtime configuration.
    pub tor: TorConfig,
    /// Connection probe tuning.
    pub probe: ProbeSettings,
    /// Routing policy for public endpoints.
    pub policy: TransportPolicy,
    /// Stop Tor once the active node no longer needs it.
    pub stop_tor_when_unused: bool,
}

/// Invalid settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A timeout was zero.
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    /// The SOCKS proxy port was zero.
    #[error("SOCKS proxy port cannot be 0")]
    ZeroPort,

    /// The SOCKS proxy host was blank.
    #[error("SOCKS proxy host cannot be blank")]
    BlankProxyHost,
}

impl RouterSettings {
    /// Applies `NODEROUTE_*` environment overrides.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = env::var("NODEROUTE_SOCKS_PROXY") {
            match parse_proxy(&value) {
                Some(proxy) => self.tor.socks_proxy = proxy,
                None => tracing::warn!(value = %value, "ignoring invalid NODEROUTE_SOCKS_PROXY"),
            }
        }

        if let Ok(value) = env::var("NODEROUTE_TOR_START_TIMEOUT_SECS") {
            match value.trim().parse() {
                Ok(secs) => self.tor.start_timeout_secs = secs,
                Err(_) => tracing::warn!(
                    value = %value,
                    "ignoring invalid NODEROUTE_TOR_START_TIMEOUT_SECS"
                ),
            }
        }

        if env::var("NODEROUTE_DIRECT_PUBLIC")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            self.policy = TransportPolicy::OnionOnly;
        }

        if let Ok(value) = env::var("NODEROUTE_PROBE_ATTEMPTS") {
            match value.trim().parse() {
                Ok(attempts) => self.probe.attempts = attempts,
                Err(_) => tracing::warn!(value = %value, "ignoring invalid NODEROUTE_PROBE_ATTEMPTS"),
            }
        }

        self
    }

    /// Checks the settings for values that would make the router unusable.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tor.socks_proxy.host.trim().is_empty() {
            return Err(ConfigError::BlankProxyHost);
        }
        if self.tor.socks_proxy.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.tor.start_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("Tor start timeout"));
        }
        if self.probe.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("probe connect timeout"));
        }
        if self.probe.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("probe request timeout"));
        }
        if self.probe.attempts == 0 {
            return Err(ConfigError::ZeroValue("probe attempts"));
        }
        Ok(())
    }
}

fn parse_proxy(value: &str) -> Option<SocksProxyConfig> {
    let value = value.trim();
    let (host, port) = value.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    Some(SocksProxyConfig::new(host, port))
}
