//! Error types for the streaming session.
//!
//! # Design
//! - Messages stay constant; operational context lives in fields.
//! - Engine failures keep their `EngineError` as the source.

use std::string::FromUtf8Error;

use reel_core::EngineError;
use thiserror::Error;

/// Errors surfaced by session operations and event handlers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been stopped and no longer accepts commands.
    #[error("session is stopped")]
    Stopped {
        /// Operation that was rejected.
        operation: &'static str,
    },
    /// The descriptor was not valid percent-encoded UTF-8.
    #[error("invalid transfer descriptor")]
    InvalidDescriptor {
        /// Decoding failure.
        #[source]
        source: FromUtf8Error,
    },
    /// A buffer window was requested with inverted bounds.
    #[error("invalid buffer window")]
    InvalidWindow {
        /// Requested first piece.
        first: u32,
        /// Requested last piece.
        last: u32,
    },
    /// The transfer has no resolved metadata yet.
    #[error("transfer metadata unavailable")]
    MetadataUnavailable {
        /// Operation that required metadata.
        operation: &'static str,
    },
    /// The transfer exposes no file that can be selected.
    #[error("transfer has no selectable file")]
    NoSelectableFile {
        /// Operation that attempted the selection.
        operation: &'static str,
    },
    /// A configuration value could not be used.
    #[error("invalid session configuration")]
    InvalidConfig {
        /// Configuration field name.
        field: &'static str,
        /// Raw value supplied.
        value: String,
        /// Static reason describing the rejection.
        reason: &'static str,
    },
    /// Session options could not be parsed.
    #[error("failed to parse session options")]
    ConfigParse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The engine rejected a command.
    #[error("engine operation failed")]
    Engine {
        /// Session operation that issued the command.
        operation: &'static str,
        /// Engine failure.
        #[source]
        source: EngineError,
    },
}

impl SessionError {
    /// Adapter for `map_err` that tags an engine failure with the issuing operation.
    pub(crate) fn engine(operation: &'static str) -> impl FnOnce(EngineError) -> Self {
        move |source| Self::Engine { operation, source }
    }
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn engine_failures_keep_operation_and_source() {
        let err = SessionError::engine("pause")(EngineError::NotRunning { operation: "pause" });
        assert_eq!(err.to_string(), "engine operation failed");
        assert!(matches!(
            err,
            SessionError::Engine {
                operation: "pause",
                ..
            }
        ));
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("engine is not running")
        );
    }

    #[test]
    fn context_stays_out_of_messages() {
        let err = SessionError::InvalidWindow { first: 9, last: 2 };
        assert_eq!(err.to_string(), "invalid buffer window");

        let err = SessionError::InvalidConfig {
            field: "look_ahead",
            value: "many".into(),
            reason: "not an integer",
        };
        assert_eq!(err.to_string(), "invalid session configuration");
        assert!(err.source().is_none());
    }
}
