//! Node configuration and resolution types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bitcoin network a wallet operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    /// Bitcoin mainnet.
    Mainnet,
    /// Testnet3.
    Testnet,
    /// Testnet4.
    #[default]
    Testnet4,
    /// Signet.
    Signet,
}

impl BitcoinNetwork {
    /// All networks, in display order.
    pub const ALL: [Self; 4] = [Self::Mainnet, Self::Testnet, Self::Testnet4, Self::Signet];

    /// Lower-case network name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Testnet4 => "testnet4",
            Self::Signet => "signet",
        }
    }
}

impl fmt::Display for BitcoinNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BitcoinNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|network| network.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown network: {s}"))
    }
}

/// Whether the wallet uses the curated presets or the user's own nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeConnectionOption {
    /// Curated public servers.
    #[default]
    Public,
    /// User-entered servers.
    Custom,
}

/// How traffic reaches a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeTransport {
    /// Tunnelled through the Tor SOCKS proxy.
    Tor,
    /// Plain socket from this device.
    Direct,
}

impl NodeTransport {
    /// Whether this transport needs Tor running.
    #[must_use]
    pub const fn requires_tor(self) -> bool {
        matches!(self, Self::Tor)
    }
}

impl fmt::Display for NodeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tor => write!(f, "tor"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// A user-entered Electrum server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomNode {
    /// Stable identifier.
    pub id: String,
    /// Optional display name.
    #[serde(default)]
    pub name: String,
    /// Endpoint as entered, e.g. `ssl://node.example:50002`.
    pub endpoint: String,
    /// Network the node serves.
    pub network: BitcoinNetwork,
    /// Requested transport. Ignored for onion and local hosts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_transport: Option<NodeTransport>,
}

impl CustomNode {
    /// Creates a node without a name or transport preference.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, network: BitcoinNetwork) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            endpoint: endpoint.into(),
            network,
            preferred_transport: None,
        }
    }

    /// Sets the transport preference.
    #[must_use]
    pub const fn with_transport(mut self, transport: NodeTransport) -> Self {
        self.preferred_transport = Some(transport);
        self
    }
}

/// A curated public Electrum server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicNode {
    /// Stable identifier, e.g. `BLOCKSTREAM_INFO`.
    pub id: String,
    /// Operator name.
    pub display_name: String,
    /// Endpoint URL.
    pub endpoint: String,
    /// Network the server serves.
    pub network: BitcoinNetwork,
}

impl PublicNode {
    /// Creates a preset.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        endpoint: impl Into<String>,
        network: BitcoinNetwork,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            endpoint: endpoint.into(),
            network,
        }
    }
}

/// Persisted node selection.
///
/// Selected ids may point at nodes that no longer exist; resolution falls
/// back instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Preset or custom mode.
    pub connection_option: NodeConnectionOption,
    /// User-entered nodes, in display order.
    pub custom_nodes: Vec<CustomNode>,
    /// Selected custom node id.
    pub selected_custom_node_id: Option<String>,
    /// Selected preset id.
    pub selected_public_node_id: Option<String>,
}

impl NodeConfig {
    /// Custom nodes for `network`, in order.
    pub fn custom_nodes_for(&self, network: BitcoinNetwork) -> impl Iterator<Item = &CustomNode> {
        self.custom_nodes.iter().filter(move |node| node.network == network)
    }
}

/// Wallet sync batch sizes for a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPreferences {
    /// Consecutive unused addresses before a full scan stops.
    pub full_scan_stop_gap: u32,
    /// Script batch size during a full scan.
    pub full_scan_batch_size: u32,
    /// Script batch size during incremental sync.
    pub incremental_batch_size: u32,
}

impl SyncPreferences {
    /// Tuning for `network`. Test networks use smaller batches.
    #[must_use]
    pub const fn for_network(network: BitcoinNetwork) -> Self {
        match network {
            BitcoinNetwork::Mainnet => Self {
                full_scan_stop_gap: 200,
                full_scan_batch_size: 64,
                incremental_batch_size: 24,
            },
            BitcoinNetwork::Testnet | BitcoinNetwork::Testnet4 | BitcoinNetwork::Signet => Self {
                full_scan_stop_gap: 120,
                full_scan_batch_size: 24,
                incremental_batch_size: 12,
            },
        }
    }
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self::for_network(BitcoinNetwork::Mainnet)
    }
}

/// The resolved server for a network, ready to hand to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectrumEndpoint {
    /// Canonical endpoint URL.
    pub url: String,
    /// Id of the node it was resolved from; `None` for built-in fallbacks.
    pub node_id: Option<String>,
    /// How to reach it.
    pub transport: NodeTransport,
    /// Whether to verify the TLS certificate against public CAs.
    pub validate_domain: bool,
    /// Client retry count.
    pub retry: u8,
    /// Client socket timeout, in seconds.
    pub timeout_secs: u64,
    /// Sync batch tuning.
    pub sync: SyncPreferences,
}

impl ElectrumEndpoint {
    /// Default client retry count.
    pub const DEFAULT_RETRY: u8 = 5;

    /// Default client socket timeout.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

    /// Whether connecting needs Tor running.
    #[must_use]
    pub const fn requires_tor(&self) -> bool {
        self.transport.requires_tor()
    }
}

/// Outcome of probing a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConnectionTestResult {
    /// Reachable. The version is absent if the metadata request failed.
    Success {
        /// Server software version, if reported.
        server_version: Option<String>,
    },
    /// Unreachable.
    Failure {
        /// Human-readable reason, ending with the endpoint.
        reason: String,
    },
}

impl ConnectionTestResult {
    /// Whether the node was reachable.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
