//! Failures raised while installing the subscriber.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;

/// Result alias used by the telemetry crate.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Reasons logging could not be set up.
#[derive(Debug)]
pub enum TelemetryError {
    /// The configured level was not a valid filter directive.
    InvalidFilter {
        /// Directive supplied by the configuration.
        directive: String,
        /// Parser failure from `tracing-subscriber`.
        source: ParseError,
    },
    /// A global subscriber was already installed.
    SubscriberInstall {
        /// Error returned by `try_init`.
        source: TryInitError,
    },
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter { .. } => formatter.write_str("invalid log filter directive"),
            Self::SubscriberInstall { .. } => {
                formatter.write_str("failed to install tracing subscriber")
            }
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidFilter { source, .. } => Some(source),
            Self::SubscriberInstall { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::util::SubscriberInitExt;

    fn try_init_error() -> std::result::Result<TryInitError, Box<dyn Error>> {
        match tracing_subscriber::registry().try_init() {
            Ok(()) => match tracing_subscriber::registry().try_init() {
                Ok(()) => Err(io::Error::other("expected init error").into()),
                Err(err) => Ok(err),
            },
            Err(err) => Ok(err),
        }
    }

    #[test]
    fn messages_are_constant_and_sources_preserved() -> std::result::Result<(), Box<dyn Error>> {
        let parse_error = EnvFilter::try_new("reel=[[")
            .err()
            .ok_or_else(|| io::Error::other("expected filter parse error"))?;
        let cases = vec![
            (
                TelemetryError::InvalidFilter {
                    directive: "reel=[[".into(),
                    source: parse_error,
                },
                "invalid log filter directive",
            ),
            (
                TelemetryError::SubscriberInstall {
                    source: try_init_error()?,
                },
                "failed to install tracing subscriber",
            ),
        ];

        for (err, message) in cases {
            assert_eq!(err.to_string(), message);
            assert!(err.source().is_some());
        }
        Ok(())
    }
}
