//! Tor-gated wallet refresh orchestration.
//!
//! The controller watches the node configuration, the selected network
//! and connectivity. For every snapshot it works out whether the active
//! node needs Tor:
//!
//! | Online | Needs Tor | Tor status | Action |
//! |--------|-----------|------------|--------|
//! | no | any | any | nothing |
//! | yes | yes | stopped / error | start Tor |
//! | yes | yes | becomes running | refresh once |
//! | yes | no | any | refresh now; optionally stop Tor |
//!
//! Only the latest snapshot matters. Repeated starts are harmless because
//! [`TorManager::start`](crate::tor::TorManager::start) is idempotent.

mod controller;

pub use controller::{LifecycleController, LifecycleHandle, LifecycleInputs, WalletRefresher};
