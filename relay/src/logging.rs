//! Diagnostic tracing for relay stages.
//!
//! Stdout carries the pipeline state document, so all log output goes to
//! stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` so dry-run notices are visible.
///
/// # Example
/// ```bash
/// RUST_LOG=relay=debug relay --no-op instantiate --phase gold_master
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
