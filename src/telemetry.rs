//! Tracing initialization for the gateway binary.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

/// Install a fmt subscriber with env-filter support.
///
/// Defaults to INFO when `RUST_LOG` is unset. Safe to call once at startup;
/// returns quietly if a global subscriber is already installed (tests).
pub fn init() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    let _ = fmt().with_env_filter(filter).try_init();
}
