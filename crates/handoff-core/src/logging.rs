//! Structured logging with `tracing`.
//!
//! Every crate logs through `tracing` macros with structured fields
//! (`channel_id = %id`, `mode = %mode`). Binaries call [`init_subscriber`]
//! or [`init_subscriber_json`] once at startup; `RUST_LOG` takes precedence
//! over the configured level.

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber with compact human-readable output on stderr.
///
/// Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with JSON lines on stderr.
///
/// Subsequent calls are no-ops.
pub fn init_subscriber_json(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}
