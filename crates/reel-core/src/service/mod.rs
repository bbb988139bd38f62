//! Engine and transfer-handle traits implemented by engine adapters.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::{
    EngineParams, FilePriority, PieceAssignment, SessionStats, TorrentFile, TorrentMetadata,
    TorrentMetainfo, TransferStatus,
};
use crate::sink::{EventSink, ListenerId};

/// Session-level engine driven by the streaming controller.
#[async_trait]
pub trait StreamEngine: Send + Sync {
    /// Start the engine with the supplied parameters.
    async fn start(&self, params: &EngineParams) -> EngineResult<()>;

    /// Stop the engine; may block until the native session has unwound.
    async fn stop(&self) -> EngineResult<()>;

    /// Pause every transfer in the session.
    async fn pause(&self) -> EngineResult<()>;

    /// Resume the session after a pause.
    async fn resume(&self) -> EngineResult<()>;

    /// Whether the session is currently paused.
    fn is_paused(&self) -> bool;

    /// Whether the session has been started and not yet stopped.
    fn is_running(&self) -> bool;

    /// Register a sink that receives every engine event.
    fn add_listener(&self, sink: EventSink) -> ListenerId;

    /// Unregister a sink; unknown identifiers are ignored.
    fn remove_listener(&self, id: ListenerId);

    /// Begin resolving metadata for a decoded descriptor (e.g. a magnet URI).
    ///
    /// Failure to resolve within `timeout` is reported as a metadata-failed event.
    async fn resolve(&self, descriptor: &str, timeout: Duration) -> EngineResult<()>;

    /// Start the payload transfer for resolved metainfo into `destination`.
    async fn begin_transfer(
        &self,
        metainfo: TorrentMetainfo,
        destination: &Path,
    ) -> EngineResult<()>;

    /// Snapshot of session-wide statistics.
    async fn stats(&self) -> EngineResult<SessionStats>;
}

/// Engine-native handle to a single transfer.
#[async_trait]
pub trait TransferHandle: Send + Sync + Debug {
    /// Stable identifier of the transfer.
    fn id(&self) -> Uuid;

    /// Current engine-reported status.
    async fn status(&self) -> EngineResult<TransferStatus>;

    /// Piece geometry, or `None` while metadata is still being resolved.
    async fn metadata(&self) -> EngineResult<Option<TorrentMetadata>>;

    /// Files of the transfer in metainfo order (empty before metadata).
    async fn files(&self) -> EngineResult<Vec<TorrentFile>>;

    /// Apply file priorities positionally, one entry per file.
    async fn set_file_priorities(&self, priorities: &[FilePriority]) -> EngineResult<()>;

    /// Apply priorities to the listed pieces; unlisted pieces keep their current priority.
    async fn set_piece_priorities(&self, assignments: &[PieceAssignment]) -> EngineResult<()>;

    /// Directory the transfer saves into.
    async fn save_path(&self) -> EngineResult<PathBuf>;

    /// Encoded metainfo, once metadata has been resolved.
    async fn metainfo(&self) -> EngineResult<Option<TorrentMetainfo>>;

    /// Resume a paused transfer.
    async fn resume(&self) -> EngineResult<()>;
}
