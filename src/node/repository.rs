//! Reactive node configuration store.

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::NodeResult;
use super::types::NodeConfig;

/// Mutation applied by [`NodeConfigRepository::update`].
pub type ConfigMutator = Box<dyn FnOnce(&mut NodeConfig) + Send>;

/// Source of the persisted [`NodeConfig`].
///
/// Storage is up to the embedding app; the router only reads the current
/// value, watches for changes and writes back failover selections.
#[async_trait]
pub trait NodeConfigRepository: Send + Sync {
    /// Subscribes to the configuration. The receiver always holds the
    /// latest value.
    fn node_config(&self) -> watch::Receiver<NodeConfig>;

    /// Applies `mutator` and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Repository`](super::NodeError::Repository) if the
    /// change could not be stored.
    async fn update(&self, mutator: ConfigMutator) -> NodeResult<()>;

    /// The current configuration.
    fn snapshot(&self) -> NodeConfig {
        self.node_config().borrow().clone()
    }
}

/// Repository that keeps the configuration in memory only.
#[derive(Debug)]
pub struct InMemoryNodeConfigRepository {
    config: watch::Sender<NodeConfig>,
}

impl InMemoryNodeConfigRepository {
    /// Creates a repository holding `config`.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        let (config, _) = watch::channel(config);
        Self { config }
    }

    /// Replaces the whole configuration.
    pub fn replace(&self, config: NodeConfig) {
        self.config.send_replace(config);
    }
}

impl Default for InMemoryNodeConfigRepository {
    fn default() -> Self {
        Self::new(NodeConfig::default())
    }
}

#[async_trait]
impl NodeConfigRepository for InMemoryNodeConfigRepository {
    fn node_config(&self) -> watch::Receiver<NodeConfig> {
        self.config.subscribe()
    }

    async fn update(&self, mutator: ConfigMutator) -> NodeResult<()> {
        self.config.send_modify(|config| mutator(config));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::types::NodeConnectionOption;

    #[tokio::test]
    async fn update_notifies_subscribers() {
        let repository = InMemoryNodeConfigRepository::default();
        let mut rx = repository.node_config();

        repository
            .update(Box::new(|config| {
                config.connection_option = NodeConnectionOption::Custom;
            }))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().connection_option, NodeConnectionOption::Custom);
        assert_eq!(
            repository.snapshot().connection_option,
            NodeConnectionOption::Custom
        );
    }

    #[test]
    fn replace_overwrites() {
        let repository = InMemoryNodeConfigRepository::default();
        repository.replace(NodeConfig {
            selected_public_node_id: Some("BITAROO_NET".to_string()),
            ..NodeConfig::default()
        });
        assert_eq!(
            repository.snapshot().selected_public_node_id.as_deref(),
            Some("BITAROO_NET")
        );
    }
}
