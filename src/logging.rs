//! Tracing subscriber setup for binaries, benches and tests
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to whoever embeds it.

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber
///
/// With `debug` every level down to TRACE is shown. Otherwise `RUST_LOG`
/// decides, falling back to warnings only. Returns `false` when a global
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_tracing(debug: bool) -> bool {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
