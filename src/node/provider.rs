//! Active endpoint selection.
//!
//! Resolution order for a network:
//!
//! 1. `Custom` mode: the selected custom node for the network, else the
//!    network's first custom node, else step 2.
//! 2. `Public` mode: the selected preset for the network, else the
//!    network's first preset, else the built-in fallback endpoint.

use std::sync::Arc;

use crate::config::TransportPolicy;
use crate::endpoint::{normalize, Endpoint, EndpointKind, EndpointScheme};

use super::error::NodeResult;
use super::presets::{default_presets, fallback_endpoint};
use super::repository::NodeConfigRepository;
use super::types::{
    BitcoinNetwork, CustomNode, ElectrumEndpoint, NodeConfig, NodeConnectionOption,
    NodeTransport, PublicNode, SyncPreferences,
};

/// Decides how to reach a host.
///
/// Onion hosts always need Tor and local hosts never use it. Public hosts
/// follow `preferred`, then `policy`.
#[must_use]
pub const fn resolve_transport(
    kind: EndpointKind,
    preferred: Option<NodeTransport>,
    policy: TransportPolicy,
) -> NodeTransport {
    match (kind, preferred, policy) {
        (EndpointKind::Onion, _, _) => NodeTransport::Tor,
        (EndpointKind::Local, _, _) => NodeTransport::Direct,
        (EndpointKind::Public, Some(transport), _) => transport,
        (EndpointKind::Public, None, TransportPolicy::AllRemote) => NodeTransport::Tor,
        (EndpointKind::Public, None, TransportPolicy::OnionOnly) => NodeTransport::Direct,
    }
}

/// Resolves the Electrum endpoint a wallet should use.
pub struct EndpointProvider {
    repository: Arc<dyn NodeConfigRepository>,
    presets: Vec<PublicNode>,
    policy: TransportPolicy,
}

impl EndpointProvider {
    /// Creates a provider over the built-in presets.
    #[must_use]
    pub fn new(repository: Arc<dyn NodeConfigRepository>, policy: TransportPolicy) -> Self {
        Self {
            repository,
            presets: default_presets(),
            policy,
        }
    }

    /// Replaces the preset list.
    #[must_use]
    pub fn with_presets(mut self, presets: Vec<PublicNode>) -> Self {
        self.presets = presets;
        self
    }

    /// The routing policy for public endpoints.
    #[must_use]
    pub const fn policy(&self) -> TransportPolicy {
        self.policy
    }

    /// Presets for `network`, in order.
    pub fn presets_for(&self, network: BitcoinNetwork) -> impl Iterator<Item = &PublicNode> {
        self.presets.iter().filter(move |p| p.network == network)
    }

    /// Resolves the active endpoint from the repository's current value.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidEndpoint`](super::NodeError::InvalidEndpoint)
    /// if the chosen node's endpoint is malformed.
    pub fn endpoint_for(&self, network: BitcoinNetwork) -> NodeResult<ElectrumEndpoint> {
        self.resolve(&self.repository.snapshot(), network)
    }

    /// Resolves the active endpoint from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidEndpoint`](super::NodeError::InvalidEndpoint)
    /// if the chosen node's endpoint is malformed.
    pub fn resolve(
        &self,
        config: &NodeConfig,
        network: BitcoinNetwork,
    ) -> NodeResult<ElectrumEndpoint> {
        if config.connection_option == NodeConnectionOption::Custom {
            if let Some(node) = select_custom(config, network) {
                let endpoint = normalize(&node.endpoint, EndpointScheme::Ssl)?;
                return Ok(self.build(
                    &endpoint,
                    Some(node.id.clone()),
                    node.preferred_transport,
                    network,
                ));
            }
            tracing::debug!(%network, "no custom node for network, using public");
        }
        self.resolve_public(config, network)
    }

    /// The preset after `current_id` in `network`'s ring, or `None` if there
    /// is no alternative or `current_id` is not a preset of `network`.
    #[must_use]
    pub fn rotate_to_next_preset(
        &self,
        network: BitcoinNetwork,
        current_id: &str,
    ) -> Option<String> {
        let ring: Vec<&PublicNode> = self.presets_for(network).collect();
        if ring.len() < 2 {
            return None;
        }
        let index = ring.iter().position(|p| p.id == current_id)?;
        Some(ring[(index + 1) % ring.len()].id.clone())
    }

    fn resolve_public(
        &self,
        config: &NodeConfig,
        network: BitcoinNetwork,
    ) -> NodeResult<ElectrumEndpoint> {
        let selected = config
            .selected_public_node_id
            .as_deref()
            .and_then(|id| self.presets_for(network).find(|p| p.id == id))
            .or_else(|| self.presets_for(network).next());

        match selected {
            Some(preset) => {
                let endpoint = normalize(&preset.endpoint, EndpointScheme::Ssl)?;
                Ok(self.build(&endpoint, Some(preset.id.clone()), None, network))
            }
            None => {
                let endpoint = normalize(fallback_endpoint(network), EndpointScheme::Ssl)?;
                Ok(self.build(&endpoint, None, None, network))
            }
        }
    }

    fn build(
        &self,
        endpoint: &Endpoint,
        node_id: Option<String>,
        preferred: Option<NodeTransport>,
        network: BitcoinNetwork,
    ) -> ElectrumEndpoint {
        ElectrumEndpoint {
            url: endpoint.url(),
            node_id,
            transport: resolve_transport(endpoint.kind(), preferred, self.policy),
            validate_domain: endpoint.kind() != EndpointKind::Onion,
            retry: ElectrumEndpoint::DEFAULT_RETRY,
            timeout_secs: ElectrumEndpoint::DEFAULT_TIMEOUT_SECS,
            sync: SyncPreferences::for_network(network),
        }
    }
}

impl std::fmt::Debug for EndpointProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointProvider")
            .field("presets", &self.presets.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn select_custom(config: &NodeConfig, network: BitcoinNetwork) -> Option<&CustomNode> {
    config
        .selected_custom_node_id
        .as_deref()
        .and_then(|id| config.custom_nodes_for(network).find(|n| n.id == id))
        .or_else(|| config.custom_nodes_for(network).next())
}
