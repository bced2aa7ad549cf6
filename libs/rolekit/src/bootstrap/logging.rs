//! Process-wide `tracing` subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::telemetry::OtelLayer;

/// Console output format.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub level: String,
    pub format: LogFormat,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Full,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Filter directive after applying `-v` flags on top of the configured level.
    #[must_use]
    pub fn effective_level(&self, verbose: u8) -> &str {
        match verbose {
            0 => &self.level,
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Install the global subscriber: env filter, console formatter and the
/// optional OpenTelemetry layer.
///
/// # Errors
/// Fails if the level directive is invalid or a global subscriber is already set.
pub fn init_logging(cfg: &LoggingConfig, verbose: u8, otel: Option<OtelLayer>) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(cfg.effective_level(verbose))?,
    };

    let console = match cfg.format {
        LogFormat::Full => fmt::layer().with_ansi(cfg.ansi).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(cfg.ansi).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_ansi(cfg.ansi).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(otel)
        .with(filter)
        .with(console)
        .try_init()?;

    Ok(())
}
