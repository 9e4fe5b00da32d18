//! Tor runtime management.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  RuntimeSnapshot   ┌──────────────┐   TorStatus
//! │  TorRuntime  │ ─────────────────► │  TorManager  │ ─────────────► subscribers
//! │ (daemon/FFI) │ ◄───────────────── │ (one writer) │
//! └──────────────┘  start/stop/...    └──────────────┘
//! ```
//!
//! # State mapping
//!
//! | Runtime state | Status |
//! |---------------|--------|
//! | `Idle` | `Stopped`, or `Connecting` while a start is pending |
//! | `Connecting` | `Connecting` with progress and latest log |
//! | `Connected` | `Running` with the reported proxy |
//! | `Disconnected` | `Stopped` |
//! | `Error` | `Error` with the runtime's message |

mod error;
mod manager;
mod runtime;
pub mod socks;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
mod types;

pub use error::{TorError, TorResult};
pub use manager::TorManager;
pub use runtime::{SystemTorRuntime, TorRuntime};
pub use types::{
    bootstrap_progress, RuntimeSnapshot, RuntimeState, SocksProxyConfig, TorConfig, TorStatus,
    DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT, DEFAULT_START_TIMEOUT_SECS,
};
