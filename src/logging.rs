//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events. Apps that already install a
//! subscriber can skip this module; apps that don't can call
//! [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "noderoute_core=info";

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Installs a debug-level subscriber that writes through the test harness.
#[cfg(any(test, feature = "test-utils"))]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
