//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// Filtering is environment-based (`RUST_LOG`), defaulting to `info`
/// globally with `debug` for the engine crates.
///
/// # Example
/// ```
/// smalt_core::init_logging();
/// tracing::info!("Engine initialized");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,smalt=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
