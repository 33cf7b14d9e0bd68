//! Structured logging initialization.
//!
//! The library only emits `tracing` events; a launcher calls
//! [`init_tracing`] once to install a subscriber.

use crossfill_types::{
    CrossfillError, LoggingConfig, Result,
    constants::{ENGINE_NAME, VERSION},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global subscriber per `config`.
///
/// `RUST_LOG` takes precedence over `config.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            CrossfillError::Configuration(format!("invalid log level {:?}: {e}", config.level))
        })?,
    };

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };
    installed.map_err(|e| {
        CrossfillError::Configuration(format!("tracing already initialized: {e}"))
    })?;
    info!(engine = ENGINE_NAME, version = VERSION, json = config.json, "logging initialized");
    Ok(())
}
