//! Scriptable runtime for exercising [`TorManager`](super::TorManager)
//! without a Tor daemon.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::{TorError, TorResult};
use super::runtime::TorRuntime;
use super::types::{RuntimeSnapshot, RuntimeState, SocksProxyConfig, TorConfig};

/// A [`TorRuntime`] whose state is driven by the test.
///
/// `start` reports [`RuntimeState::Connecting`] and then waits for the test
/// to call [`connect`](Self::connect) or [`fail`](Self::fail).
#[derive(Debug)]
pub struct ScriptedTorRuntime {
    state: watch::Sender<RuntimeSnapshot>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    renew_result: AtomicBool,
    reject_start: AtomicBool,
}

impl ScriptedTorRuntime {
    /// Creates an idle runtime.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(RuntimeSnapshot::default());
        Self {
            state,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            renew_result: AtomicBool::new(true),
            reject_start: AtomicBool::new(false),
        }
    }

    /// Number of `start` commands received.
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop` commands received.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of `clear_state` commands received.
    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent `start` commands fail.
    pub fn reject_starts(&self, reject: bool) {
        self.reject_start.store(reject, Ordering::SeqCst);
    }

    /// Sets what `renew_identity` returns.
    pub fn set_renew_result(&self, result: bool) {
        self.renew_result.store(result, Ordering::SeqCst);
    }

    /// Publishes an arbitrary snapshot.
    pub fn emit(&self, snapshot: RuntimeSnapshot) {
        self.state.send_replace(snapshot);
    }

    /// Reports bootstrap progress.
    pub fn progress(&self, progress: u8, log: &str) {
        self.emit(RuntimeSnapshot {
            state: RuntimeState::Connecting,
            progress,
            latest_log: log.to_string(),
            ..RuntimeSnapshot::default()
        });
    }

    /// Reports a usable proxy.
    pub fn connect(&self, proxy: SocksProxyConfig) {
        self.emit(RuntimeSnapshot {
            state: RuntimeState::Connected,
            proxy: Some(proxy),
            progress: 100,
            latest_log: "Bootstrapped 100% (done): Done".to_string(),
            error: None,
        });
    }

    /// Reports a runtime failure.
    pub fn fail(&self, message: &str) {
        self.emit(RuntimeSnapshot {
            state: RuntimeState::Error,
            error: Some(message.to_string()),
            ..RuntimeSnapshot::default()
        });
    }

    /// Reports shutdown.
    pub fn disconnect(&self) {
        self.emit(RuntimeSnapshot {
            state: RuntimeState::Disconnected,
            ..RuntimeSnapshot::default()
        });
    }
}

impl Default for ScriptedTorRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TorRuntime for ScriptedTorRuntime {
    fn subscribe(&self) -> watch::Receiver<RuntimeSnapshot> {
        self.state.subscribe()
    }

    async fn start(&self, _config: &TorConfig) -> TorResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_start.load(Ordering::SeqCst) {
            return Err(TorError::Runtime("start rejected".to_string()));
        }
        self.progress(0, "Starting Tor");
        Ok(())
    }

    async fn stop(&self) -> TorResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.disconnect();
        Ok(())
    }

    async fn renew_identity(&self) -> bool {
        self.renew_result.load(Ordering::SeqCst)
    }

    async fn clear_state(&self, _config: &TorConfig) -> TorResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
