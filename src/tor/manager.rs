//! Tor lifecycle owner.
//!
//! [`TorManager`] is the only writer of [`TorStatus`]. A single ingestion
//! task reads the runtime's snapshots and republishes them as statuses;
//! every other method only issues commands or reads.
//!
//! # Readiness
//!
//! Callers that need the proxy await [`TorManager::await_proxy`]. All
//! waiters watch the same status channel, so one transition to
//! [`TorStatus::Running`] releases all of them and one
//! [`TorStatus::Error`] fails all of them. Dropping a waiter's future
//! cancels only that waiter.
//!
//! # Keep-alive
//!
//! Work wrapped in [`TorManager::with_tor_proxy`] holds Tor up. A
//! [`TorManager::stop`] issued meanwhile is deferred until the last holder
//! finishes.

use std::future::Future;
use std::mem::discriminant;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::error::{TorError, TorResult};
use super::runtime::TorRuntime;
use super::types::{RuntimeSnapshot, RuntimeState, SocksProxyConfig, TorConfig, TorStatus};

/// Owner of the Tor runtime and publisher of [`TorStatus`].
///
/// Must be created inside a Tokio runtime; construction spawns the
/// ingestion task, which is aborted when the manager is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use noderoute_core::tor::{SystemTorRuntime, TorConfig, TorManager};
///
/// let manager = TorManager::new(Arc::new(SystemTorRuntime::new()), TorConfig::default());
/// let proxy = manager.await_proxy().await?;
/// println!("tunnel through {proxy}");
/// ```
pub struct TorManager {
    shared: Arc<Shared>,
    status_rx: watch::Receiver<TorStatus>,
    ingest: JoinHandle<()>,
}

struct Shared {
    runtime: Arc<dyn TorRuntime>,
    config: Mutex<TorConfig>,
    /// Set by `start`, cleared when the request resolves.
    start_pending: AtomicBool,
    /// Forces the ingestion task to re-evaluate the current snapshot.
    wake: Notify,
    /// Serializes start and stop commands.
    command_lock: tokio::sync::Mutex<()>,
    holders: AtomicUsize,
    stop_deferred: AtomicBool,
}

impl TorManager {
    /// Creates a manager around `runtime`.
    ///
    /// `config` is used for starts issued implicitly by
    /// [`await_proxy`](Self::await_proxy) until an explicit
    /// [`start`](Self::start) replaces it.
    #[must_use]
    pub fn new(runtime: Arc<dyn TorRuntime>, config: TorConfig) -> Self {
        let runtime_rx = runtime.subscribe();
        let (status_tx, status_rx) = watch::channel(TorStatus::Stopped);
        let shared = Arc::new(Shared {
            runtime,
            config: Mutex::new(config),
            start_pending: AtomicBool::new(false),
            wake: Notify::new(),
            command_lock: tokio::sync::Mutex::new(()),
            holders: AtomicUsize::new(0),
            stop_deferred: AtomicBool::new(false),
        });
        let ingest = tokio::spawn(ingest(Arc::clone(&shared), runtime_rx, status_tx));
        Self {
            shared,
            status_rx,
            ingest,
        }
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> TorStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TorStatus> {
        self.status_rx.clone()
    }

    /// The latest diagnostic line reported by the runtime.
    #[must_use]
    pub fn latest_log(&self) -> String {
        self.shared.runtime.subscribe().borrow().latest_log.clone()
    }

    /// The proxy from the running status, else the proxy Tor last ran on,
    /// else the configured proxy. Advisory only; use
    /// [`await_proxy`](Self::await_proxy) to wait for readiness.
    #[must_use]
    pub fn current_proxy(&self) -> SocksProxyConfig {
        match self.status_rx.borrow().proxy() {
            Some(proxy) => proxy.clone(),
            None => self.shared.config().socks_proxy,
        }
    }

    /// Requests a Tor bootstrap.
    ///
    /// Does nothing if Tor is already running or connecting, or if an
    /// earlier start has not resolved yet. Returns once the runtime has
    /// accepted the request; progress is observable through
    /// [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the start command.
    pub async fn start(&self, config: TorConfig) -> TorResult<()> {
        let _guard = self.shared.command_lock.lock().await;
        *self
            .shared
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = config.clone();
        self.shared.stop_deferred.store(false, Ordering::SeqCst);

        if self.status_rx.borrow().is_active() {
            return Ok(());
        }
        if self.shared.start_pending.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.wake.notify_one();

        tracing::info!(proxy = %config.socks_proxy, "starting Tor");
        if let Err(e) = self.shared.runtime.start(&config).await {
            tracing::warn!(error = %e, "Tor runtime rejected start");
            self.shared.start_pending.store(false, Ordering::SeqCst);
            self.shared.wake.notify_one();
            return Err(e);
        }
        Ok(())
    }

    /// Requests shutdown.
    ///
    /// Deferred while any [`with_tor_proxy`](Self::with_tor_proxy) block is
    /// running.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the stop command.
    pub async fn stop(&self) -> TorResult<()> {
        if self.shared.holders.load(Ordering::SeqCst) > 0 {
            tracing::debug!("Tor proxy in use, deferring stop");
            self.shared.stop_deferred.store(true, Ordering::SeqCst);
            return Ok(());
        }
        self.shared.stop_now().await
    }

    /// Asks the runtime for fresh circuits.
    pub async fn renew_identity(&self) -> bool {
        let renewed = self.shared.runtime.renew_identity().await;
        tracing::debug!(renewed, "Tor identity renewal requested");
        renewed
    }

    /// Stops Tor and erases its cached state.
    ///
    /// Unlike [`stop`](Self::stop) this is never deferred.
    ///
    /// # Errors
    ///
    /// Returns an error if stopping or clearing fails.
    pub async fn clear_persistent_state(&self) -> TorResult<()> {
        self.shared.stop_now().await?;
        let config = self.shared.config();
        self.shared.runtime.clear_state(&config).await
    }

    /// Waits until Tor is running and returns its proxy.
    ///
    /// Issues a start if Tor is not already running or connecting. The
    /// wait is bounded by the configured start timeout and can be
    /// cancelled by dropping the future.
    ///
    /// # Errors
    ///
    /// - [`TorError::Unavailable`] if Tor transitions to an error
    /// - [`TorError::StoppedBeforeReady`] if Tor stops while waiting
    /// - [`TorError::BootstrapTimeout`] if the timeout elapses
    /// - [`TorError::Closed`] if the manager shuts down
    pub async fn await_proxy(&self) -> TorResult<SocksProxyConfig> {
        let mut status_rx = self.status_rx.clone();
        if let Some(proxy) = status_rx.borrow_and_update().proxy() {
            return Ok(proxy.clone());
        }

        let config = self.shared.config();
        self.start(config.clone()).await?;

        let timeout = config.start_timeout();
        tokio::time::timeout(timeout, self.wait_until_ready(&mut status_rx))
            .await
            .map_err(|_| {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Tor bootstrap timed out");
                TorError::BootstrapTimeout(timeout.as_secs())
            })?
    }

    /// Runs `f` with the Tor proxy while keeping Tor up.
    ///
    /// # Errors
    ///
    /// Returns the [`await_proxy`](Self::await_proxy) error if Tor never
    /// becomes ready; `f` is not called in that case.
    pub async fn with_tor_proxy<F, Fut, T>(&self, f: F) -> TorResult<T>
    where
        F: FnOnce(SocksProxyConfig) -> Fut,
        Fut: Future<Output = T>,
    {
        let _hold = KeepAlive::acquire(&self.shared);
        let proxy = self.await_proxy().await?;
        Ok(f(proxy).await)
    }

    async fn wait_until_ready(
        &self,
        status_rx: &mut watch::Receiver<TorStatus>,
    ) -> TorResult<SocksProxyConfig> {
        let mut seen_connecting = false;
        // Until the first publication after our start request, the status
        // is the one we saw beforehand and an error in it is not ours.
        let mut fresh = status_rx.has_changed().map_err(|_| TorError::Closed)?;
        loop {
            let status = status_rx.borrow_and_update().clone();

            match status {
                TorStatus::Running { proxy } => return Ok(proxy),
                TorStatus::Error { message } if fresh => {
                    return Err(TorError::Unavailable(message))
                }
                TorStatus::Connecting { .. } => seen_connecting = true,
                TorStatus::Stopped
                    if seen_connecting || !self.shared.start_pending.load(Ordering::SeqCst) =>
                {
                    return Err(TorError::StoppedBeforeReady)
                }
                TorStatus::Stopped | TorStatus::Error { .. } => {}
            }

            status_rx.changed().await.map_err(|_| TorError::Closed)?;
            fresh = true;
        }
    }
}

impl Drop for TorManager {
    fn drop(&mut self) {
        self.ingest.abort();
    }
}

impl std::fmt::Debug for TorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorManager")
            .field("status", &*self.status_rx.borrow())
            .field("holders", &self.shared.holders.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn config(&self) -> TorConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn stop_now(&self) -> TorResult<()> {
        let _guard = self.command_lock.lock().await;
        self.stop_deferred.store(false, Ordering::SeqCst);
        self.start_pending.store(false, Ordering::SeqCst);
        self.wake.notify_one();
        tracing::info!("stopping Tor");
        self.runtime.stop().await
    }

    /// Republishes `snapshot`. `fresh` is set when the runtime reported it,
    /// as opposed to a re-evaluation after a command.
    fn publish(
        &self,
        snapshot: &RuntimeSnapshot,
        fresh: bool,
        status_tx: &watch::Sender<TorStatus>,
    ) {
        let pending = self.start_pending.load(Ordering::SeqCst);
        let next = TorStatus::from_runtime(snapshot, pending, &self.config().socks_proxy);

        if let TorStatus::Running { proxy } = &next {
            self.config
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .socks_proxy = proxy.clone();
        }

        status_tx.send_if_modified(|current| {
            // A terminal report answers an outstanding start even when it
            // repeats the previous status. A shutdown only counts once the
            // start has been seen connecting.
            let resolves_start = fresh
                && pending
                && match snapshot.state {
                    RuntimeState::Connected | RuntimeState::Error => true,
                    RuntimeState::Disconnected => {
                        matches!(current, TorStatus::Connecting { .. })
                    }
                    RuntimeState::Idle | RuntimeState::Connecting => false,
                };
            if resolves_start {
                self.start_pending.store(false, Ordering::SeqCst);
            }
            let modified = *current != next;
            if modified {
                if discriminant(current) != discriminant(&next) {
                    log_transition(&next);
                }
                *current = next.clone();
            }
            modified || resolves_start
        });
    }
}

fn log_transition(status: &TorStatus) {
    match status {
        TorStatus::Stopped => tracing::info!("Tor stopped"),
        TorStatus::Connecting { progress, .. } => {
            tracing::info!(progress, "Tor connecting");
        }
        TorStatus::Running { proxy } => tracing::info!(proxy = %proxy, "Tor running"),
        TorStatus::Error { message } => tracing::warn!(error = %message, "Tor error"),
    }
}

async fn ingest(
    shared: Arc<Shared>,
    mut runtime_rx: watch::Receiver<RuntimeSnapshot>,
    status_tx: watch::Sender<TorStatus>,
) {
    let mut runtime_changed = false;
    loop {
        // A wake can race a runtime report; the report is still fresh.
        let fresh = runtime_changed || runtime_rx.has_changed().unwrap_or(false);
        let snapshot = runtime_rx.borrow_and_update().clone();
        shared.publish(&snapshot, fresh, &status_tx);

        runtime_changed = tokio::select! {
            changed = runtime_rx.changed() => {
                if changed.is_err() {
                    tracing::debug!("Tor runtime closed its state channel");
                    break;
                }
                true
            }
            () = shared.wake.notified() => false,
        };
    }
}

/// Counts an active proxy user; the last one out runs any deferred stop.
struct KeepAlive {
    shared: Arc<Shared>,
}

impl KeepAlive {
    fn acquire(shared: &Arc<Shared>) -> Self {
        shared.holders.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        let last = self.shared.holders.fetch_sub(1, Ordering::SeqCst) == 1;
        if !last || !self.shared.stop_deferred.load(Ordering::SeqCst) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        handle.spawn(async move {
            // A new holder may have arrived or a start may have cancelled
            // the stop since the count hit zero.
            if shared.holders.load(Ordering::SeqCst) > 0
                || !shared.stop_deferred.load(Ordering::SeqCst)
            {
                return;
            }
            if let Err(e) = shared.stop_now().await {
                tracing::warn!(error = %e, "deferred Tor stop failed");
            }
        });
    }
}
