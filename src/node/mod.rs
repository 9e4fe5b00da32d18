//! Node configuration, endpoint resolution and connection testing.
//!
//! # Transport resolution
//!
//! | Host kind | Node preference | Policy | Transport |
//! |-----------|-----------------|--------|-----------|
//! | onion | any | any | Tor |
//! | local | any | any | direct |
//! | public | set | any | the preference |
//! | public | unset | `AllRemote` | Tor |
//! | public | unset | `OnionOnly` | direct |
//!
//! TLS certificates are validated for every host except onion services.

mod error;
mod presets;
mod probe;
mod provider;
mod repository;
mod tester;
mod types;

pub use error::{NodeError, NodeResult, ProbeError, ProbeResult};
pub use presets::{default_presets, fallback_endpoint};
pub use probe::{ElectrumProbe, TcpElectrumProbe};
pub use provider::{resolve_transport, EndpointProvider};
pub use repository::{ConfigMutator, InMemoryNodeConfigRepository, NodeConfigRepository};
pub use tester::{describe_failure, ConnectionTester};
pub use types::{
    BitcoinNetwork, ConnectionTestResult, CustomNode, ElectrumEndpoint, NodeConfig,
    NodeConnectionOption, NodeTransport, PublicNode, SyncPreferences,
};
