//! NodeRoute Core Library
//!
//! Decides how a Bitcoin wallet reaches its Electrum node. Endpoints are
//! normalized and classified as onion, local or public; onion nodes (and
//! public nodes, unless configured otherwise) are reached through a
//! process-wide Tor manager, and wallet refreshes wait until Tor is
//! usable.
//!
//! - [`endpoint`]: endpoint parsing and classification
//! - [`tor`]: the Tor manager and SOCKS5 client
//! - [`node`]: node configuration, resolution and connection tests
//! - [`lifecycle`]: Tor-gated wallet refresh
//! - [`NodeRouter`]: wires the pieces together

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod config;
pub mod endpoint;
pub mod lifecycle;
pub mod logging;
pub mod node;
pub mod sanitize;
pub mod tor;

pub use api::NodeRouter;
pub use config::{RouterSettings, TransportPolicy};
