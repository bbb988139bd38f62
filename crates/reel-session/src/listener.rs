//! Caller-facing callbacks.

use std::sync::{Arc, PoisonError, RwLock};

use crate::status::SessionStatus;

/// Receives a snapshot for every lifecycle event the session acts on.
///
/// Callbacks run on the session's dispatch task, one at a time and in event order. They must
/// not await session operations such as `download_magnet` or `stop`. A panicking callback is
/// logged and does not stop delivery of later events.
#[allow(unused_variables)]
pub trait SessionListener: Send + Sync {
    /// The transfer was added and its file selection applied.
    fn on_add_torrent(&self, status: &SessionStatus) {}

    /// Metadata arrived and the payload transfer is being started.
    fn on_metadata_received(&self, status: &SessionStatus) {}

    /// Descriptor resolution failed; `status.message` carries the engine text.
    fn on_metadata_failed(&self, status: &SessionStatus) {}

    /// A piece inside the buffer window finished downloading.
    fn on_piece_finished(&self, status: &SessionStatus) {}

    /// The selected payload finished downloading.
    fn on_torrent_finished(&self, status: &SessionStatus) {}

    /// The transfer failed; `status.message` carries the engine text.
    fn on_torrent_error(&self, status: &SessionStatus) {}

    /// The transfer was paused.
    fn on_torrent_paused(&self, status: &SessionStatus) {}

    /// The transfer was resumed.
    fn on_torrent_resumed(&self, status: &SessionStatus) {}

    /// The transfer was removed from the engine.
    fn on_torrent_removed(&self, status: &SessionStatus) {}

    /// The transfer's files were deleted.
    fn on_torrent_deleted(&self, status: &SessionStatus) {}

    /// Deleting the transfer's files failed; `status.message` carries the engine text.
    fn on_torrent_delete_failed(&self, status: &SessionStatus) {}
}

/// Replaceable listener shared between the controller and the dispatch task.
#[derive(Clone, Default)]
pub(crate) struct ListenerSlot {
    inner: Arc<RwLock<Option<Arc<dyn SessionListener>>>>,
}

impl ListenerSlot {
    pub(crate) fn replace(&self, listener: Option<Arc<dyn SessionListener>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub(crate) fn current(&self) -> Option<Arc<dyn SessionListener>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
