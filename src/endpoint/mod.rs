//! Endpoint normalization and classification.
//!
//! Turns user-entered or preset node strings into a canonical
//! [`Endpoint`] and decides whether the host is an onion service, a
//! local-network address or a public host. Everything that later decides
//! between direct and Tor-routed traffic starts from this classification.
//!
//! # Wire format
//!
//! ```text
//! <scheme>://<host>[:<port>]      scheme ∈ {ssl, tcp}
//! tcp://[fe80::1]:50001           IPv6 hosts are bracketed
//! tcp://abc...xyz.onion:50001     onion hosts are always tcp
//! ```
//!
//! # Classification
//!
//! | Host | Kind |
//! |------|------|
//! | `*.onion` | [`EndpointKind::Onion`] |
//! | `localhost`, `127/8`, `10/8`, `172.16/12`, `192.168/16`, `100.64/10` | [`EndpointKind::Local`] |
//! | `::1`, `fc00::/7`, `fe80::/10` | [`EndpointKind::Local`] |
//! | anything else | [`EndpointKind::Public`] |

mod classifier;
mod error;
mod types;

pub use classifier::{build_url, detect_kind, is_onion_address, normalize};
pub use error::{EndpointError, EndpointResult};
pub use types::{Endpoint, EndpointKind, EndpointScheme};
