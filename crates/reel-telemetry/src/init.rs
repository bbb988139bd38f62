//! Subscriber installation and the logging configuration read from `REEL_LOG_*`.
//!
//! # Design
//! - One entry point installs either the JSON or the pretty formatter.
//! - The build SHA is recorded on first install and never changes afterwards.
//! - `RUST_LOG` wins over the configured level when present.

use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Filter applied when neither `RUST_LOG` nor `REEL_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LEVEL_ENV: &str = "REEL_LOG_LEVEL";
const FORMAT_ENV: &str = "REEL_LOG_FORMAT";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Install the process-wide tracing subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the configured level is not a valid filter directive, or if the
/// tracing subscriber cannot be installed (for example, because another subscriber has
/// already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let _ = BUILD_SHA.set(config.build_sha.clone());

    let filter = build_env_filter(&config.level)?;
    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .try_init(),
    }
    .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Build SHA recorded by the first [`init_logging`] call, or `dev`.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidFilter {
        directive: level.to_string(),
        source,
    })
}

/// Settings for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level or filter directive (e.g., `info`, `reel_session=debug`).
    pub level: String,
    /// Formatter used by the subscriber.
    pub format: LogFormat,
    /// Build identifier exposed through [`build_sha`].
    pub build_sha: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::infer(),
            build_sha: build_sha().to_string(),
        }
    }
}

impl LoggingConfig {
    /// Build a configuration from `REEL_LOG_LEVEL` / `REEL_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(LEVEL_ENV).ok().as_deref(),
            std::env::var(FORMAT_ENV).ok().as_deref(),
        )
    }

    fn from_values(level: Option<&str>, format: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            level: level
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map_or(defaults.level, str::to_string),
            format: format.map_or(defaults.format, LogFormat::parse),
            build_sha: defaults.build_sha,
        }
    }
}

/// Log line encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable text.
    Pretty,
}

impl LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a format name, falling back to [`LogFormat::infer`] for unknown values.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "text" => Self::Pretty,
            _ => Self::infer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_variants() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("text"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::infer());
    }

    #[test]
    fn config_values_fall_back_to_defaults() {
        let config = LoggingConfig::from_values(None, None);
        assert_eq!(config.level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.format, LogFormat::infer());

        let blank = LoggingConfig::from_values(Some("   "), Some("json"));
        assert_eq!(blank.level, DEFAULT_LOG_LEVEL);
        assert_eq!(blank.format, LogFormat::Json);

        let custom = LoggingConfig::from_values(Some("reel_session=debug"), Some("pretty"));
        assert_eq!(custom.level, "reel_session=debug");
        assert_eq!(custom.format, LogFormat::Pretty);
    }

    #[test]
    fn second_install_is_rejected() {
        let config = LoggingConfig {
            level: "info".into(),
            format: LogFormat::Pretty,
            build_sha: "dev".into(),
        };
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::SubscriberInstall { .. } | TelemetryError::InvalidFilter { .. })
        ));
    }
}
