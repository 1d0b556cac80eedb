//! Subscriber setup for the engine's `tracing` events.
//!
//! Only available with the `structured-logging` feature:
//!
//! ```toml
//! [dependencies]
//! gbn-infer = { version = "0.1", features = ["structured-logging"] }
//! ```
//!
//! ```no_run
//! use gbn_infer::logging::{init_tracing, LogFormat, LogLevel};
//!
//! init_tracing(LogLevel::Debug, LogFormat::Compact).expect("logger already set");
//! ```
//!
//! `RUST_LOG` takes precedence over the level passed in, e.g.
//! `RUST_LOG=gbn_infer::simplification=trace` shows every applied rewrite.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{GbnError, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format with colors.
    #[default]
    Pretty,
    /// Single-line format without colors.
    Compact,
    /// JSON, one object per event.
    Json,
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_tracing(level: LogLevel, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().with_ansi(false).compact())
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    installed.map_err(|e| GbnError::Config(format!("failed to initialize tracing: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::default().as_str(), "info");
        assert_eq!(LogLevel::Trace.as_str(), "trace");
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(LogLevel::Warn, LogFormat::Compact);
        assert!(init_tracing(LogLevel::Warn, LogFormat::Compact).is_err());
    }
}
