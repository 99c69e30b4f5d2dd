//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to the whole
//! process. Initialisation is idempotent: a second call leaves the first
//! subscriber in place.
//!
//! ```bash
//! BOREALIS_APPLICATION__LOG_LEVEL=debug cargo run --example dummy_spectrometer
//! RUST_LOG=borealis::orchestrator=trace cargo run --example dummy_spectrometer
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::SessionConfig;
use crate::error::{AppResult, BorealisError};

/// Accepted values for `application.log_level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Install a global `fmt` subscriber at `level`, or JSON lines when `json` is set.
///
/// # Errors
/// `Configuration` if `level` is not one of [`LOG_LEVELS`].
pub fn init_tracing(level: &str, json: bool) -> AppResult<()> {
    let filter = build_filter(level)?;

    let installed = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    // Already installed (tests, embedding application): keep the existing one
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already set, keeping it");
    }
    Ok(())
}

/// Initialise tracing from the `application` section of a session configuration.
pub fn init_from_config(config: &SessionConfig) -> AppResult<()> {
    init_tracing(&config.application.log_level, config.application.json_logs)
}

fn build_filter(level: &str) -> AppResult<EnvFilter> {
    let level = level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(BorealisError::Configuration(format!(
            "Invalid log_level '{level}'. Must be one of: {}",
            LOG_LEVELS.join(", ")
        )));
    }

    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
}
