//! Logging bootstrap, matching the teacher's `tracing`/`tracing-subscriber`
//! choice. Called once from `catalog-server::main`.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber with an env-filter
/// (`RUST_LOG`, defaulting to `info`). Safe to call more than once in
/// tests — subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
