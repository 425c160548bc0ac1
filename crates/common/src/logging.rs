//! Logging utilities for the APC election components.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing with plain text output.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter(default_level))
        .init();
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(filter(default_level))
        .init();
}

/// Pick the output format from a config string ("json" or anything else).
pub fn init_with_format(default_level: &str, format: Option<&str>) {
    match format {
        Some(f) if f.eq_ignore_ascii_case("json") => init_json(default_level),
        _ => init(default_level),
    }
}
