//! Structured logging built on the tracing crate.
//!
//! Initializes the global subscriber from [`LoggingConfig`]: an
//! env-filter level (overridable via `RUST_LOG`), one of three output
//! formats, and an optional log file destination.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            let writer = Mutex::new(file);

            match config.format {
                LogFormat::Pretty => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init(),
                LogFormat::Compact => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact().with_writer(writer).with_ansi(false))
                    .try_init(),
                LogFormat::Json => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init(),
            }
        }
        None => match config.format {
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init(),
        },
    }
    .context("failed to install tracing subscriber")
}
