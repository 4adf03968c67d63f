//! Structured logging built on the tracing crate.

use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for the process.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Setting
/// `SUKASHI_LOG_JSON=1` switches to JSON output for log aggregation.
///
/// Uses `try_init`, so calling this when a subscriber is already installed
/// (repeated test setup, embedding hosts with their own subscriber)
/// returns an error instead of panicking.
pub fn init_subscriber() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("SUKASHI_LOG_JSON").map(|v| v == "1").unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().try_init().map_err(Into::into)
    } else {
        builder.try_init().map_err(Into::into)
    }
}
