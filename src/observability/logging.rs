//! # Logging
//!
//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies to this
//! crate and `warn` to everything else, so SDK and driver chatter stays out of
//! rotation logs.

use crate::config::RotationConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a subscriber is already installed"
)]
pub fn init_logging(config: &RotationConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}

fn default_directive(level: &str) -> String {
    format!("warn,credential_rotator={}", level.to_lowercase())
}
