use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::node::{BitcoinNetwork, EndpointProvider, NodeConfig};
use crate::tor::{TorConfig, TorManager, TorStatus};

/// Entry point into the wallet sync engine.
#[async_trait]
pub trait WalletRefresher: Send + Sync {
    /// Refreshes every wallet on `network`.
    async fn refresh(&self, network: BitcoinNetwork);
}

/// Value streams the controller reacts to.
#[derive(Debug, Clone)]
pub struct LifecycleInputs {
    /// Persisted node configuration.
    pub config: watch::Receiver<NodeConfig>,
    /// Network selected in the app.
    pub network: watch::Receiver<BitcoinNetwork>,
    /// Whether the device has connectivity.
    pub online: watch::Receiver<bool>,
}

/// Starts Tor when the active node needs it and refreshes wallets once it
/// is usable.
pub struct LifecycleController {
    tor: Arc<TorManager>,
    provider: Arc<EndpointProvider>,
    refresher: Arc<dyn WalletRefresher>,
    tor_config: TorConfig,
    stop_tor_when_unused: bool,
}

impl LifecycleController {
    /// Creates a controller. `tor_config` is used for every start it
    /// issues.
    #[must_use]
    pub fn new(
        tor: Arc<TorManager>,
        provider: Arc<EndpointProvider>,
        refresher: Arc<dyn WalletRefresher>,
        tor_config: TorConfig,
    ) -> Self {
        Self {
            tor,
            provider,
            refresher,
            tor_config,
            stop_tor_when_unused: false,
        }
    }

    /// Stops Tor once the active node no longer needs it.
    #[must_use]
    pub const fn stop_tor_when_unused(mut self, enabled: bool) -> Self {
        self.stop_tor_when_unused = enabled;
        self
    }

    /// Spawns the controller. It runs until the handle is dropped or any
    /// input stream closes.
    #[must_use]
    pub fn start(self, inputs: LifecycleInputs) -> LifecycleHandle {
        LifecycleHandle {
            task: tokio::spawn(self.run(inputs)),
        }
    }

    async fn run(self, mut inputs: LifecycleInputs) {
        let mut tor_rx = self.tor.subscribe();
        let mut state = LoopState::default();

        loop {
            let snapshot = Snapshot {
                config: inputs.config.borrow_and_update().clone(),
                network: *inputs.network.borrow_and_update(),
                online: *inputs.online.borrow_and_update(),
                tor: tor_rx.borrow_and_update().clone(),
            };
            self.evaluate(&snapshot, &mut state);

            let changed = tokio::select! {
                changed = inputs.config.changed() => changed,
                changed = inputs.network.changed() => changed,
                changed = inputs.online.changed() => changed,
                changed = tor_rx.changed() => changed,
            };
            if changed.is_err() {
                break;
            }
        }
        tracing::debug!("lifecycle inputs closed, controller exiting");
    }

    fn evaluate(&self, snapshot: &Snapshot, state: &mut LoopState) {
        let running = snapshot.tor.is_running();
        // Compared against the last evaluation rather than the wake-up
        // source, since one wake-up can carry several changes.
        let inputs = (snapshot.config.clone(), snapshot.network, snapshot.online);
        let inputs_changed = state.last_inputs.as_ref() != Some(&inputs);
        state.last_inputs = Some(inputs);

        if !snapshot.online {
            state.tor_was_running = running && state.requires_tor;
            return;
        }

        let requires_tor = match self.provider.resolve(&snapshot.config, snapshot.network) {
            Ok(endpoint) => endpoint.requires_tor(),
            Err(e) => {
                tracing::warn!(network = %snapshot.network, error = %e, "cannot resolve active node");
                state.tor_was_running = false;
                return;
            }
        };
        state.requires_tor = requires_tor;

        if requires_tor {
            match &snapshot.tor {
                TorStatus::Stopped | TorStatus::Error { .. } => self.start_tor(state),
                TorStatus::Connecting { .. } | TorStatus::Running { .. } => {}
            }
            if running && !state.tor_was_running {
                self.refresh(snapshot.network);
            }
        } else {
            if inputs_changed {
                self.refresh(snapshot.network);
            }
            if self.stop_tor_when_unused && snapshot.tor.is_active() {
                self.stop_tor(state);
            }
        }

        state.tor_was_running = requires_tor && running;
    }

    fn start_tor(&self, state: &mut LoopState) {
        if state.pending_start.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let tor = Arc::clone(&self.tor);
        let config = self.tor_config.clone();
        state.pending_start = Some(tokio::spawn(async move {
            if let Err(e) = tor.start(config).await {
                tracing::warn!(error = %e, "unable to start Tor for the active node");
            }
        }));
    }

    fn stop_tor(&self, state: &mut LoopState) {
        if state.pending_stop.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let tor = Arc::clone(&self.tor);
        state.pending_stop = Some(tokio::spawn(async move {
            if let Err(e) = tor.stop().await {
                tracing::warn!(error = %e, "unable to stop Tor after it became unused");
            }
        }));
    }

    fn refresh(&self, network: BitcoinNetwork) {
        tracing::info!(%network, "refreshing wallets");
        let refresher = Arc::clone(&self.refresher);
        tokio::spawn(async move { refresher.refresh(network).await });
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("tor_config", &self.tor_config)
            .field("stop_tor_when_unused", &self.stop_tor_when_unused)
            .finish_non_exhaustive()
    }
}

/// Owns the running controller. Dropping it stops the controller but
/// leaves Tor as it is.
#[derive(Debug)]
pub struct LifecycleHandle {
    task: JoinHandle<()>,
}

impl LifecycleHandle {
    /// Stops the controller.
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Whether the controller has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LifecycleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Snapshot {
    config: NodeConfig,
    network: BitcoinNetwork,
    online: bool,
    tor: TorStatus,
}

#[derive(Default)]
struct LoopState {
    tor_was_running: bool,
    requires_tor: bool,
    last_inputs: Option<(NodeConfig, BitcoinNetwork, bool)>,
    pending_start: Option<JoinHandle<()>>,
    pending_stop: Option<JoinHandle<()>>,
}
