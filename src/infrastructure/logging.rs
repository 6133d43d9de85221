//! Structured logging setup built on tracing.
//!
//! Embedders that already install their own subscriber can skip this
//! entirely; `init` is a convenience for binaries and integration tests.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the stdout layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Machine-readable JSON lines.
    Json,
    /// Human-readable output for interactive runs.
    #[default]
    Pretty,
}

/// Install the global subscriber. `RUST_LOG` still takes precedence over
/// `default_level`. Fails if a subscriber is already installed.
pub fn init(default_level: &str, format: LogFormat) -> Result<()> {
    let level = parse_level(default_level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow!(
            "invalid log level {other:?}, expected one of: trace, debug, info, warn, error"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels_parse() {
        for level in ["trace", "debug", "info", "warn", "error", "INFO"] {
            assert!(parse_level(level).is_ok(), "{level} should parse");
        }
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(parse_level("verbose").is_err());
    }
}
