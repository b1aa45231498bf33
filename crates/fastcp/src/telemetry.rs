//! Tracing initialization for the fastcp tool.

use tracing_subscriber::EnvFilter;

/// Initialize the console subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Call once at
/// startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
