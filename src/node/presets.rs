//! Curated public Electrum servers.

use super::types::{BitcoinNetwork, PublicNode};

const PRESETS: &[(&str, &str, &str, BitcoinNetwork)] = &[
    ("SIGNET_MEMPOOL_SPACE", "Mempool.space", "ssl://mempool.space:60602", BitcoinNetwork::Signet),
    ("SETHFORPRIVACY_COM", "Seth For Privacy", "ssl://fulcrum.sethforprivacy.com:50002", BitcoinNetwork::Mainnet),
    ("BLOCKSTREAM_INFO", "Blockstream", "ssl://electrum.blockstream.info:60002", BitcoinNetwork::Mainnet),
    ("BITAROO_NET", "Bitaroo", "ssl://electrum.bitaroo.net:50002", BitcoinNetwork::Mainnet),
    ("DIY_NODES_COM", "DIY Nodes", "ssl://electrum.diynodes.com:50002", BitcoinNetwork::Mainnet),
    ("TESTNET_BLOCKSTREAM_INFO", "Blockstream", "ssl://electrum.blockstream.info:60002", BitcoinNetwork::Testnet),
    ("TESTNET_ARANGUREN", "Aranguren", "ssl://testnet.aranguren.org:51002", BitcoinNetwork::Testnet),
    ("TESTNET_QTORNADO", "Qtornado", "ssl://testnet.qtornado.com:51002", BitcoinNetwork::Testnet),
    ("TESTNET4_MEMPOOL_SPACE", "Mempool.space", "ssl://mempool.space:40002", BitcoinNetwork::Testnet4),
    ("TESTNET4_BLACKIE", "Blackie", "ssl://blackie.c3-soft.com:57010", BitcoinNetwork::Testnet4),
];

/// The built-in preset list, in display order.
#[must_use]
pub fn default_presets() -> Vec<PublicNode> {
    PRESETS
        .iter()
        .map(|&(id, name, endpoint, network)| PublicNode::new(id, name, endpoint, network))
        .collect()
}

/// Endpoint used when a network has no usable preset.
#[must_use]
pub const fn fallback_endpoint(network: BitcoinNetwork) -> &'static str {
    match network {
        BitcoinNetwork::Mainnet => "ssl://electrum.blockstream.info:60002",
        BitcoinNetwork::Testnet => "ssl://testnet.blockstream.info:60002",
        BitcoinNetwork::Testnet4 => "ssl://mempool.space:40002",
        BitcoinNetwork::Signet => "ssl://signet-electrumx.wakiyamap.dev:50002",
    }
}
