//! Tracing/logging initialization.
//!
//! Store operations open spans carrying `operation`, aggregate ids, counts and
//! versions; this installs the subscriber that writes them out.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FORMAT: &str = "ESDOC_LOG_FORMAT";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable, for local development.
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl TracingConfig {
    /// Defaults, with the format taken from `ESDOC_LOG_FORMAT` (`json` or `pretty`).
    pub fn from_env() -> Self {
        let format = match std::env::var(ENV_LOG_FORMAT).as_deref() {
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        Self {
            format,
            ..Self::default()
        }
    }

    /// `RUST_LOG` when set and valid, otherwise `default_filter`.
    pub fn filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter)
                .with_context(|| format!("invalid default filter '{}'", self.default_filter)),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let _ = init_with(&TracingConfig::from_env());
}

/// Install a subscriber for `config`. `Ok(false)` when one is already installed.
pub fn init_with(config: &TracingConfig) -> anyhow::Result<bool> {
    let filter = config.filter()?;

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };
    Ok(installed.is_ok())
}
