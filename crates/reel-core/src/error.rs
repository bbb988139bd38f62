//! Error types reported by engine implementations.

use std::error::Error;

use thiserror::Error;
use uuid::Uuid;

/// Primary error type for engine and transfer handle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has not been started or has already been stopped.
    #[error("engine is not running")]
    NotRunning {
        /// Operation that was rejected.
        operation: &'static str,
    },
    /// The transfer handle no longer refers to a live transfer.
    #[error("transfer not found")]
    TransferNotFound {
        /// Identifier of the missing transfer.
        transfer_id: Uuid,
    },
    /// The operation requires metadata that has not been resolved yet.
    #[error("transfer metadata unavailable")]
    MetadataUnavailable {
        /// Operation that required metadata.
        operation: &'static str,
        /// Identifier of the transfer.
        transfer_id: Uuid,
    },
    /// The engine rejected the supplied descriptor.
    #[error("invalid transfer descriptor")]
    InvalidDescriptor {
        /// Static reason describing the rejection.
        reason: &'static str,
    },
    /// Native engine call failed.
    #[error("engine operation failed")]
    OperationFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Transfer identifier when available.
        transfer_id: Option<Uuid>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl EngineError {
    /// Build an operation failure with structured context.
    pub fn op_failed(
        operation: &'static str,
        transfer_id: Option<Uuid>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::OperationFailed {
            operation,
            transfer_id,
            source: Box::new(source),
        }
    }
}

/// Convenience alias for engine operation results.
pub type EngineResult<T> = Result<T, EngineError>;
