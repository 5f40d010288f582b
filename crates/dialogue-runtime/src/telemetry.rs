//! Structured logging setup: `tracing-subscriber` with an `EnvFilter` read
//! from `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Call once, at process startup —
/// calling it twice panics, the same as `tracing_subscriber`'s own
/// `try_init` would.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
