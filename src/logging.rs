//! Tracing setup for binaries and tests that embed the pipeline engine.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! left to the application. [`init_tracing`] is a convenience for the common
//! case.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit default is given.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the filter: `RUST_LOG` wins over `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed, which makes
/// it safe to call from several tests.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter(default_filter))
        .try_init()
        .is_ok()
}
