//! Logging setup.
//!
//! Structured logging through `tracing`. The level comes from the logging
//! config section unless `RUST_LOG` overrides it; a debug flag from the
//! CLI wins over both.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initializes the global subscriber. Later calls are no-ops, so tests can
/// call this freely.
pub fn setup_logging(settings: &LoggingSettings, debug: bool) {
    let level = if debug { "debug" } else { &settings.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if settings.json_format {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init();
    }
}
