//! Reusable helpers for router integration tests.
//!
//! Tor is simulated with `ScriptedTorRuntime`; nothing here touches the
//! network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use noderoute_core::lifecycle::WalletRefresher;
use noderoute_core::node::{
    BitcoinNetwork, CustomNode, InMemoryNodeConfigRepository, NodeConfig, NodeConnectionOption,
};
use noderoute_core::tor::testing::ScriptedTorRuntime;
use noderoute_core::{NodeRouter, RouterSettings};

/// Records every refresh request.
#[derive(Debug, Default)]
pub struct RecordingRefresher {
    calls: Mutex<Vec<BitcoinNetwork>>,
}

impl RecordingRefresher {
    /// Networks refreshed so far, in call order.
    pub fn calls(&self) -> Vec<BitcoinNetwork> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletRefresher for RecordingRefresher {
    async fn refresh(&self, network: BitcoinNetwork) {
        self.calls.lock().unwrap().push(network);
    }
}

/// A router over a scripted runtime and an in-memory repository.
pub struct Harness {
    pub runtime: Arc<ScriptedTorRuntime>,
    pub repository: Arc<InMemoryNodeConfigRepository>,
    pub router: NodeRouter,
}

pub fn harness(config: NodeConfig, settings: RouterSettings) -> Harness {
    let runtime = Arc::new(ScriptedTorRuntime::new());
    let repository = Arc::new(InMemoryNodeConfigRepository::new(config));
    let router = NodeRouter::new(runtime.clone(), repository.clone(), settings)
        .expect("router should build");
    Harness {
        runtime,
        repository,
        router,
    }
}

/// Config that selects a single custom node.
pub fn custom_config(node: CustomNode) -> NodeConfig {
    NodeConfig {
        connection_option: NodeConnectionOption::Custom,
        selected_custom_node_id: Some(node.id.clone()),
        custom_nodes: vec![node],
        ..NodeConfig::default()
    }
}

/// A mainnet node on the LAN.
pub fn local_node() -> CustomNode {
    CustomNode::new("lan", "tcp://192.168.1.10:50001", BitcoinNetwork::Mainnet)
}

/// A mainnet onion node.
pub fn onion_node() -> CustomNode {
    CustomNode::new(
        "onion",
        "ssl://abcdefghijklmnopqrstuvwxyz234567abcdefghijklmnopqrstuvwx.onion:50001",
        BitcoinNetwork::Mainnet,
    )
}

/// Lets spawned tasks run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
