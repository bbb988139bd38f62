//! Tagged events delivered by the engine to the streaming session.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::service::TransferHandle;

/// Shared reference to an engine-native transfer handle.
pub type SharedHandle = Arc<dyn TransferHandle>;

/// Events emitted by the engine on its callback thread.
///
/// The set is closed: engine alerts the session does not consume are mapped to
/// [`EngineEvent::Unhandled`] by the engine adapter.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A transfer handle was created (paused) and is ready for file selection.
    TorrentAdded {
        /// Handle of the new transfer.
        handle: SharedHandle,
    },
    /// Metadata for a resolved descriptor arrived.
    MetadataReceived {
        /// Handle owning the metadata.
        handle: SharedHandle,
    },
    /// Descriptor resolution failed or timed out.
    MetadataFailed {
        /// Handle of the failed resolution.
        handle: SharedHandle,
        /// Engine-provided failure description.
        message: String,
    },
    /// A piece finished downloading and passed verification.
    PieceFinished {
        /// Handle of the transfer.
        handle: SharedHandle,
        /// Zero-based piece index.
        piece_index: u32,
    },
    /// All selected payload finished downloading.
    TorrentFinished {
        /// Handle of the transfer.
        handle: SharedHandle,
    },
    /// The transfer hit an error.
    TorrentError {
        /// Handle of the transfer.
        handle: SharedHandle,
        /// Engine-provided failure description.
        message: String,
    },
    /// The transfer was paused.
    TorrentPaused {
        /// Handle of the transfer.
        handle: SharedHandle,
    },
    /// The transfer was resumed.
    TorrentResumed {
        /// Handle of the transfer.
        handle: SharedHandle,
    },
    /// The transfer was removed from the engine.
    TorrentRemoved {
        /// Handle of the transfer.
        handle: SharedHandle,
    },
    /// The transfer's files were deleted.
    TorrentDeleted {
        /// Handle of the transfer.
        handle: SharedHandle,
    },
    /// Deleting the transfer's files failed.
    TorrentDeleteFailed {
        /// Handle of the transfer.
        handle: SharedHandle,
        /// Engine-provided failure description.
        message: String,
    },
    /// Periodic DHT statistics are available through `StreamEngine::stats`.
    DhtStats,
    /// The DHT finished its bootstrap phase.
    DhtBootstrap,
    /// An engine alert the session does not act on.
    Unhandled {
        /// Native alert name, for diagnostics.
        kind: String,
    },
}

/// Discriminator for [`EngineEvent`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`EngineEvent::TorrentAdded`].
    TorrentAdded,
    /// See [`EngineEvent::MetadataReceived`].
    MetadataReceived,
    /// See [`EngineEvent::MetadataFailed`].
    MetadataFailed,
    /// See [`EngineEvent::PieceFinished`].
    PieceFinished,
    /// See [`EngineEvent::TorrentFinished`].
    TorrentFinished,
    /// See [`EngineEvent::TorrentError`].
    TorrentError,
    /// See [`EngineEvent::TorrentPaused`].
    TorrentPaused,
    /// See [`EngineEvent::TorrentResumed`].
    TorrentResumed,
    /// See [`EngineEvent::TorrentRemoved`].
    TorrentRemoved,
    /// See [`EngineEvent::TorrentDeleted`].
    TorrentDeleted,
    /// See [`EngineEvent::TorrentDeleteFailed`].
    TorrentDeleteFailed,
    /// See [`EngineEvent::DhtStats`].
    DhtStats,
    /// See [`EngineEvent::DhtBootstrap`].
    DhtBootstrap,
    /// See [`EngineEvent::Unhandled`].
    Unhandled,
}

impl EventKind {
    /// Machine-friendly name used in structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TorrentAdded => "torrent_added",
            Self::MetadataReceived => "metadata_received",
            Self::MetadataFailed => "metadata_failed",
            Self::PieceFinished => "piece_finished",
            Self::TorrentFinished => "torrent_finished",
            Self::TorrentError => "torrent_error",
            Self::TorrentPaused => "torrent_paused",
            Self::TorrentResumed => "torrent_resumed",
            Self::TorrentRemoved => "torrent_removed",
            Self::TorrentDeleted => "torrent_deleted",
            Self::TorrentDeleteFailed => "torrent_delete_failed",
            Self::DhtStats => "dht_stats",
            Self::DhtBootstrap => "dht_bootstrap",
            Self::Unhandled => "unhandled",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl EngineEvent {
    /// Discriminator for the event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::TorrentAdded { .. } => EventKind::TorrentAdded,
            Self::MetadataReceived { .. } => EventKind::MetadataReceived,
            Self::MetadataFailed { .. } => EventKind::MetadataFailed,
            Self::PieceFinished { .. } => EventKind::PieceFinished,
            Self::TorrentFinished { .. } => EventKind::TorrentFinished,
            Self::TorrentError { .. } => EventKind::TorrentError,
            Self::TorrentPaused { .. } => EventKind::TorrentPaused,
            Self::TorrentResumed { .. } => EventKind::TorrentResumed,
            Self::TorrentRemoved { .. } => EventKind::TorrentRemoved,
            Self::TorrentDeleted { .. } => EventKind::TorrentDeleted,
            Self::TorrentDeleteFailed { .. } => EventKind::TorrentDeleteFailed,
            Self::DhtStats => EventKind::DhtStats,
            Self::DhtBootstrap => EventKind::DhtBootstrap,
            Self::Unhandled { .. } => EventKind::Unhandled,
        }
    }

    /// Transfer handle carried by the event, if any.
    #[must_use]
    pub fn handle(&self) -> Option<&SharedHandle> {
        match self {
            Self::TorrentAdded { handle }
            | Self::MetadataReceived { handle }
            | Self::MetadataFailed { handle, .. }
            | Self::PieceFinished { handle, .. }
            | Self::TorrentFinished { handle }
            | Self::TorrentError { handle, .. }
            | Self::TorrentPaused { handle }
            | Self::TorrentResumed { handle }
            | Self::TorrentRemoved { handle }
            | Self::TorrentDeleted { handle }
            | Self::TorrentDeleteFailed { handle, .. } => Some(handle),
            Self::DhtStats | Self::DhtBootstrap | Self::Unhandled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_free_events_report_kind() {
        assert_eq!(EngineEvent::DhtStats.kind(), EventKind::DhtStats);
        assert!(EngineEvent::DhtBootstrap.handle().is_none());

        let unhandled = EngineEvent::Unhandled {
            kind: "tracker_announce".into(),
        };
        assert_eq!(unhandled.kind().to_string(), "unhandled");
        assert!(unhandled.handle().is_none());
    }
}
