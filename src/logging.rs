//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; the binary (or a test that wants
//! output) installs a subscriber through [`init`]. `RUST_LOG` overrides the
//! configured level when it is set.

use crate::error::{ReplicatorError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Normalize a configured level name to an `EnvFilter` directive.
///
/// Unknown names fall back to `info`.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Install the global fmt subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| ReplicatorError::Config(format!("failed to initialize logging: {}", e)))
}
