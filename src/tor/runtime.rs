//! The seam between [`TorManager`](super::TorManager) and whatever actually
//! runs Tor.
//!
//! A runtime publishes [`RuntimeSnapshot`]s on a watch channel and accepts
//! commands. The manager never assumes a command took effect until the
//! runtime reports the matching state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::TorResult;
use super::socks;
use super::types::{RuntimeSnapshot, RuntimeState, SocksProxyConfig, TorConfig};

/// A Tor client runtime.
#[async_trait]
pub trait TorRuntime: Send + Sync {
    /// Subscribes to state reports. The receiver always holds the latest
    /// snapshot.
    fn subscribe(&self) -> watch::Receiver<RuntimeSnapshot>;

    /// Requests a bootstrap. Returns once the request is accepted, not once
    /// Tor is connected.
    async fn start(&self, config: &TorConfig) -> TorResult<()>;

    /// Requests shutdown.
    async fn stop(&self) -> TorResult<()>;

    /// Asks for fresh circuits. Returns whether the runtime did so.
    async fn renew_identity(&self) -> bool;

    /// Deletes cached consensus and keys. `config` is the manager's
    /// current configuration and names the state directory, if any.
    async fn clear_state(&self, config: &TorConfig) -> TorResult<()>;
}

/// Runtime backed by a Tor daemon managed outside this process.
///
/// Starting means waiting for the daemon's SOCKS port to answer a SOCKS5
/// greeting. Stopping only forgets the connection; the daemon keeps
/// running.
pub struct SystemTorRuntime {
    state: Arc<watch::Sender<RuntimeSnapshot>>,
    data_dir: Option<PathBuf>,
    attempts: u32,
    retry_delay: Duration,
    bootstrap: Mutex<Option<JoinHandle<()>>>,
}

impl SystemTorRuntime {
    /// Default number of reachability checks before giving up.
    pub const DEFAULT_ATTEMPTS: u32 = 30;

    /// Default delay between reachability checks.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

    /// Creates an idle runtime.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(RuntimeSnapshot::default());
        Self {
            state: Arc::new(state),
            data_dir: None,
            attempts: Self::DEFAULT_ATTEMPTS,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            bootstrap: Mutex::new(None),
        }
    }

    /// Sets the directory removed by [`TorRuntime::clear_state`] when the
    /// manager's [`TorConfig`] does not name one.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Overrides how often and how fast the SOCKS port is polled.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    fn abort_bootstrap(&self) {
        let handle = self
            .bootstrap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Default for SystemTorRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemTorRuntime {
    fn drop(&mut self) {
        self.abort_bootstrap();
    }
}

#[async_trait]
impl TorRuntime for SystemTorRuntime {
    fn subscribe(&self) -> watch::Receiver<RuntimeSnapshot> {
        self.state.subscribe()
    }

    async fn start(&self, config: &TorConfig) -> TorResult<()> {
        if matches!(
            self.state.borrow().state,
            RuntimeState::Connecting | RuntimeState::Connected
        ) {
            return Ok(());
        }

        let proxy = config.socks_proxy.clone();
        tracing::info!(proxy = %proxy, "waiting for Tor SOCKS port");
        self.state.send_replace(RuntimeSnapshot {
            state: RuntimeState::Connecting,
            latest_log: format!("Waiting for SOCKS proxy at {proxy}"),
            ..RuntimeSnapshot::default()
        });

        let task = tokio::spawn(poll_proxy(
            Arc::clone(&self.state),
            proxy,
            self.attempts,
            self.retry_delay,
        ));
        let previous = self
            .bootstrap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn stop(&self) -> TorResult<()> {
        self.abort_bootstrap();
        self.state.send_replace(RuntimeSnapshot {
            state: RuntimeState::Disconnected,
            ..RuntimeSnapshot::default()
        });
        Ok(())
    }

    async fn renew_identity(&self) -> bool {
        tracing::debug!("identity renewal needs a control port, skipping");
        false
    }

    async fn clear_state(&self, config: &TorConfig) -> TorResult<()> {
        self.stop().await?;
        let Some(dir) = config.data_dir.as_ref().or(self.data_dir.as_ref()) else {
            return Ok(());
        };
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {
                tracing::info!(path = %dir.display(), "cleared Tor state");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn poll_proxy(
    state: Arc<watch::Sender<RuntimeSnapshot>>,
    proxy: SocksProxyConfig,
    attempts: u32,
    retry_delay: Duration,
) {
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match socks::probe_proxy(&proxy).await {
            Ok(()) => {
                tracing::info!(proxy = %proxy, attempt, "Tor SOCKS port is ready");
                state.send_replace(RuntimeSnapshot {
                    state: RuntimeState::Connected,
                    proxy: Some(proxy),
                    progress: 100,
                    latest_log: "Bootstrapped 100% (done): Done".to_string(),
                    error: None,
                });
                return;
            }
            Err(e) => {
                tracing::debug!(proxy = %proxy, attempt, error = %e, "SOCKS port not ready");
                last_error = e.to_string();
                state.send_modify(|snapshot| {
                    snapshot.latest_log =
                        format!("SOCKS proxy not reachable (attempt {attempt}/{attempts}): {e}");
                });
            }
        }
        if attempt < attempts {
            tokio::time::sleep(retry_delay).await;
        }
    }

    tracing::warn!(proxy = %proxy, "Tor SOCKS port never became reachable");
    state.send_modify(|snapshot| {
        snapshot.state = RuntimeState::Error;
        snapshot.proxy = None;
        snapshot.error = Some(format!(
            "Tor SOCKS proxy at {proxy} is not reachable: {last_error}"
        ));
    });
}
