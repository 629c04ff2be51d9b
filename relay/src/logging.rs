//! Developer diagnostics via `tracing`.
//!
//! Tracing output goes to stderr and is never persisted. The run record under
//! `.relay/runs/` is the product output and does not depend on the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (the configured
/// `log_level`) applies. Falls back to `warn` if that directive is invalid.
///
/// # Example
/// ```bash
/// RUST_LOG=relay=debug relay do TICKET.md
/// ```
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
