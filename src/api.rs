//! Top-level entry point wiring the router's singletons together.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;

use crate::config::RouterSettings;
use crate::lifecycle::{LifecycleController, LifecycleHandle, LifecycleInputs, WalletRefresher};
use crate::node::{
    BitcoinNetwork, ConnectionTestResult, ConnectionTester, CustomNode, ElectrumEndpoint,
    ElectrumProbe, EndpointProvider, NodeConfigRepository, NodeConnectionOption, NodeResult,
    TcpElectrumProbe,
};
use crate::tor::{TorManager, TorRuntime};

/// Node routing for a wallet app.
///
/// Owns the one [`TorManager`] for the process and hands it to everything
/// that needs Tor. Create one router and share it.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use noderoute_core::{NodeRouter, RouterSettings};
/// use noderoute_core::node::{BitcoinNetwork, InMemoryNodeConfigRepository};
/// use noderoute_core::tor::SystemTorRuntime;
///
/// let router = NodeRouter::new(
///     Arc::new(SystemTorRuntime::new()),
///     Arc::new(InMemoryNodeConfigRepository::default()),
///     RouterSettings::default().with_env_overrides(),
/// )?;
/// let endpoint = router.endpoint_for(BitcoinNetwork::Mainnet)?;
/// ```
pub struct NodeRouter {
    tor: Arc<TorManager>,
    repository: Arc<dyn NodeConfigRepository>,
    provider: Arc<EndpointProvider>,
    tester: ConnectionTester,
    settings: RouterSettings,
}

impl NodeRouter {
    /// Creates a router that probes nodes over TCP/TLS.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ProbeSetup`](crate::node::NodeError::ProbeSetup)
    /// if the TLS client cannot be configured.
    pub fn new(
        runtime: Arc<dyn TorRuntime>,
        repository: Arc<dyn NodeConfigRepository>,
        settings: RouterSettings,
    ) -> NodeResult<Self> {
        let probe = TcpElectrumProbe::new(settings.probe.clone())?;
        Ok(Self::with_probe(runtime, repository, Arc::new(probe), settings))
    }

    /// Creates a router with a custom probe.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_probe(
        runtime: Arc<dyn TorRuntime>,
        repository: Arc<dyn NodeConfigRepository>,
        probe: Arc<dyn ElectrumProbe>,
        settings: RouterSettings,
    ) -> Self {
        let tor = Arc::new(TorManager::new(runtime, settings.tor.clone()));
        let provider = Arc::new(EndpointProvider::new(
            Arc::clone(&repository),
            settings.policy,
        ));
        let tester = ConnectionTester::new(Arc::clone(&tor), probe, settings.policy);
        tracing::debug!(policy = %settings.policy, "node router created");
        Self {
            tor,
            repository,
            provider,
            tester,
            settings,
        }
    }

    /// The Tor manager.
    #[must_use]
    pub const fn tor(&self) -> &Arc<TorManager> {
        &self.tor
    }

    /// The endpoint provider.
    #[must_use]
    pub const fn provider(&self) -> &Arc<EndpointProvider> {
        &self.provider
    }

    /// The connection tester.
    #[must_use]
    pub const fn tester(&self) -> &ConnectionTester {
        &self.tester
    }

    /// The settings the router was built with.
    #[must_use]
    pub const fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Resolves the active endpoint for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidEndpoint`](crate::node::NodeError::InvalidEndpoint)
    /// if the active node's endpoint is malformed.
    pub fn endpoint_for(&self, network: BitcoinNetwork) -> NodeResult<ElectrumEndpoint> {
        self.provider.endpoint_for(network)
    }

    /// Starts the lifecycle controller against the repository's config.
    ///
    /// The controller lives as long as the returned handle.
    #[must_use]
    pub fn spawn_lifecycle(
        &self,
        refresher: Arc<dyn WalletRefresher>,
        network: watch::Receiver<BitcoinNetwork>,
        online: watch::Receiver<bool>,
    ) -> LifecycleHandle {
        LifecycleController::new(
            Arc::clone(&self.tor),
            Arc::clone(&self.provider),
            refresher,
            self.settings.tor.clone(),
        )
        .stop_tor_when_unused(self.settings.stop_tor_when_unused)
        .start(LifecycleInputs {
            config: self.repository.node_config(),
            network,
            online,
        })
    }

    /// Switches the selected preset for `network` to the next one and
    /// stores the choice.
    ///
    /// Returns the new preset id, or `None` when custom nodes are in use
    /// or the network has no alternative preset.
    ///
    /// # Errors
    ///
    /// Returns an error if the active endpoint cannot be resolved or the
    /// repository rejects the update.
    pub async fn fail_over(&self, network: BitcoinNetwork) -> NodeResult<Option<String>> {
        let config = self.repository.snapshot();
        if config.connection_option == NodeConnectionOption::Custom {
            return Ok(None);
        }
        let active = self.provider.resolve(&config, network)?;
        let Some(next) = active
            .node_id
            .as_deref()
            .and_then(|current| self.provider.rotate_to_next_preset(network, current))
        else {
            tracing::debug!(%network, "no alternative preset to fail over to");
            return Ok(None);
        };

        let selected = next.clone();
        self.repository
            .update(Box::new(move |config| {
                config.selected_public_node_id = Some(selected);
            }))
            .await?;
        tracing::info!(%network, preset = %next, "failed over to next preset");
        Ok(Some(next))
    }

    /// Tests `nodes` concurrently, returning results in input order.
    pub async fn test_all(&self, nodes: &[CustomNode]) -> Vec<NodeResult<ConnectionTestResult>> {
        join_all(nodes.iter().map(|node| self.tester.test(node))).await
    }
}

impl std::fmt::Debug for NodeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRouter")
            .field("tor", &self.tor)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InMemoryNodeConfigRepository, NodeConfig};
    use crate::tor::testing::ScriptedTorRuntime;

    fn router(config: NodeConfig) -> (Arc<InMemoryNodeConfigRepository>, NodeRouter) {
        let repository = Arc::new(InMemoryNodeConfigRepository::new(config));
        let router = NodeRouter::new(
            Arc::new(ScriptedTorRuntime::new()),
            repository.clone(),
            RouterSettings::default(),
        )
        .unwrap();
        (repository, router)
    }

    #[tokio::test]
    async fn fail_over_persists_next_preset() {
        let (repository, router) = router(NodeConfig {
            selected_public_node_id: Some("BLOCKSTREAM_INFO".to_string()),
            ..NodeConfig::default()
        });

        let next = router.fail_over(BitcoinNetwork::Mainnet).await.unwrap();
        assert_eq!(next.as_deref(), Some("BITAROO_NET"));
        assert_eq!(
            repository.snapshot().selected_public_node_id.as_deref(),
            Some("BITAROO_NET")
        );
    }

    #[tokio::test]
    async fn fail_over_without_alternative_keeps_selection() {
        let (repository, router) = router(NodeConfig {
            selected_public_node_id: Some("SIGNET_MEMPOOL_SPACE".to_string()),
            ..NodeConfig::default()
        });

        assert_eq!(router.fail_over(BitcoinNetwork::Signet).await.unwrap(), None);
        assert_eq!(
            repository.snapshot().selected_public_node_id.as_deref(),
            Some("SIGNET_MEMPOOL_SPACE")
        );
    }

    #[tokio::test]
    async fn fail_over_in_custom_mode_is_noop() {
        let (_repository, router) = router(NodeConfig {
            connection_option: NodeConnectionOption::Custom,
            ..NodeConfig::default()
        });
        assert_eq!(router.fail_over(BitcoinNetwork::Mainnet).await.unwrap(), None);
    }

    #[tokio::test]
    async fn endpoint_for_uses_repository() {
        let (_repository, router) = router(NodeConfig::default());
        let endpoint = router.endpoint_for(BitcoinNetwork::Testnet4).unwrap();
        assert_eq!(endpoint.url, "ssl://mempool.space:40002");
    }

    #[tokio::test]
    async fn debug_includes_router_name() {
        let (_repository, router) = router(NodeConfig::default());
        assert!(format!("{router:?}").contains("NodeRouter"));
    }
}
