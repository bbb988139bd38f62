#![allow(clippy::redundant_pub_crate)]

//! Dispatch task that turns engine events into buffer updates and listener callbacks.
//!
//! # Design
//! - One task drains the event stream, so handlers run serially and own the window state.
//! - Handler failures and panics, including listener panics, are logged with the event kind
//!   and swallowed; the loop keeps draining.
//! - Shutdown is signalled through a oneshot; queued events are dropped once it fires.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use reel_core::{
    EngineEvent, EventKind, PieceSpan, SharedHandle, StreamEngine, isolate_file, largest_file,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::buffer::BufferWindow;
use crate::error::{SessionError, SessionResult};
use crate::listener::{ListenerSlot, SessionListener};
use crate::readiness::ReadinessGate;
use crate::status::{ResolvedLocations, SessionStatus};

pub(crate) fn spawn(
    mut router: EventRouter,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(events);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = events.next() => {
                    match event {
                        Some(event) => {
                            let kind = event.kind();
                            let outcome = AssertUnwindSafe(router.dispatch(event))
                                .catch_unwind()
                                .await;
                            if outcome.is_err() {
                                warn!(event = %kind, "session event handler panicked");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        debug!("session dispatch loop stopped");
    })
}

pub(crate) struct EventRouter {
    engine: Arc<dyn StreamEngine>,
    gate: Arc<ReadinessGate>,
    listener: ListenerSlot,
    download_dir: PathBuf,
    look_ahead: usize,
    buffer: BufferWindow,
    locations: ResolvedLocations,
}

impl EventRouter {
    pub(crate) fn new(
        engine: Arc<dyn StreamEngine>,
        gate: Arc<ReadinessGate>,
        listener: ListenerSlot,
        download_dir: PathBuf,
        look_ahead: usize,
    ) -> Self {
        Self {
            engine,
            gate,
            listener,
            download_dir,
            look_ahead,
            buffer: BufferWindow::unbounded(look_ahead),
            locations: ResolvedLocations::default(),
        }
    }

    pub(crate) async fn dispatch(&mut self, event: EngineEvent) {
        let kind = event.kind();
        if let Err(err) = self.handle(event).await {
            warn!(event = %kind, error = %err, "session event handler failed");
        }
    }

    async fn handle(&mut self, event: EngineEvent) -> SessionResult<()> {
        match event {
            EngineEvent::TorrentAdded { handle } => self.on_torrent_added(&handle).await,
            EngineEvent::MetadataReceived { handle } => self.on_metadata_received(&handle).await,
            EngineEvent::PieceFinished {
                handle,
                piece_index,
            } => self.on_piece_finished(&handle, piece_index).await,
            EngineEvent::DhtStats => {
                let stats = self
                    .engine
                    .stats()
                    .await
                    .map_err(SessionError::engine("dht_stats"))?;
                self.gate.report_node_count(stats.dht_nodes);
                Ok(())
            }
            EngineEvent::DhtBootstrap => {
                self.gate.report_bootstrap_complete();
                Ok(())
            }
            EngineEvent::MetadataFailed { handle, message } => {
                self.forward(&handle, Some(message), EventKind::MetadataFailed, |l, s| {
                    l.on_metadata_failed(s);
                })
                .await
            }
            EngineEvent::TorrentFinished { handle } => {
                self.forward(&handle, None, EventKind::TorrentFinished, |l, s| {
                    l.on_torrent_finished(s);
                })
                .await
            }
            EngineEvent::TorrentError { handle, message } => {
                self.forward(&handle, Some(message), EventKind::TorrentError, |l, s| {
                    l.on_torrent_error(s);
                })
                .await
            }
            EngineEvent::TorrentPaused { handle } => {
                self.forward(&handle, None, EventKind::TorrentPaused, |l, s| {
                    l.on_torrent_paused(s);
                })
                .await
            }
            EngineEvent::TorrentResumed { handle } => {
                self.forward(&handle, None, EventKind::TorrentResumed, |l, s| {
                    l.on_torrent_resumed(s);
                })
                .await
            }
            EngineEvent::TorrentRemoved { handle } => {
                self.forward(&handle, None, EventKind::TorrentRemoved, |l, s| {
                    l.on_torrent_removed(s);
                })
                .await
            }
            EngineEvent::TorrentDeleted { handle } => {
                self.forward(&handle, None, EventKind::TorrentDeleted, |l, s| {
                    l.on_torrent_deleted(s);
                })
                .await
            }
            EngineEvent::TorrentDeleteFailed { handle, message } => {
                self.forward(
                    &handle,
                    Some(message),
                    EventKind::TorrentDeleteFailed,
                    |l, s| l.on_torrent_delete_failed(s),
                )
                .await
            }
            EngineEvent::Unhandled { kind } => {
                debug!(alert = %kind, "ignoring engine event");
                Ok(())
            }
        }
    }

    async fn on_torrent_added(&mut self, handle: &SharedHandle) -> SessionResult<()> {
        let torrent_id = handle.id();
        let metadata = handle
            .metadata()
            .await
            .map_err(SessionError::engine("select_file"))?;
        let Some(metadata) = metadata else {
            debug!(%torrent_id, "transfer added before metadata; file selection deferred");
            let status = self.snapshot(handle, None).await?;
            self.notify(EventKind::TorrentAdded, &status, |l, s| l.on_add_torrent(s));
            return handle
                .resume()
                .await
                .map_err(SessionError::engine("select_file"));
        };

        let files = handle
            .files()
            .await
            .map_err(SessionError::engine("select_file"))?;
        let (target_index, target_path) = largest_file(&files)
            .map(|file| (file.index, file.path.clone()))
            .ok_or(SessionError::NoSelectableFile {
                operation: "select_file",
            })?;
        handle
            .set_file_priorities(&isolate_file(&files, target_index))
            .await
            .map_err(SessionError::engine("select_file"))?;

        let files = handle
            .files()
            .await
            .map_err(SessionError::engine("select_file"))?;
        let span = PieceSpan::covering(&files, &metadata).ok_or(
            SessionError::NoSelectableFile {
                operation: "select_file",
            },
        )?;
        self.buffer = BufferWindow::new(span.first, span.last, self.look_ahead)?;
        self.push_priorities(handle).await?;
        info!(
            %torrent_id,
            file = %target_path,
            first_piece = span.first,
            last_piece = span.last,
            "selected largest file for streaming"
        );

        let status = self.snapshot(handle, None).await?;
        self.notify(EventKind::TorrentAdded, &status, |l, s| l.on_add_torrent(s));
        handle
            .resume()
            .await
            .map_err(SessionError::engine("select_file"))
    }

    async fn on_metadata_received(&mut self, handle: &SharedHandle) -> SessionResult<()> {
        let save_path = handle
            .save_path()
            .await
            .map_err(SessionError::engine("metadata_received"))?;
        let files = handle
            .files()
            .await
            .map_err(SessionError::engine("metadata_received"))?;
        let largest = largest_file(&files).map(|file| save_path.join(&file.path));
        self.locations = ResolvedLocations {
            save_location: Some(save_path),
            largest_file: largest,
        };

        let status = self.snapshot(handle, None).await?;
        self.notify(EventKind::MetadataReceived, &status, |l, s| {
            l.on_metadata_received(s);
        });

        let metainfo = handle
            .metainfo()
            .await
            .map_err(SessionError::engine("begin_transfer"))?
            .ok_or(SessionError::MetadataUnavailable {
                operation: "begin_transfer",
            })?;
        info!(
            torrent_id = %handle.id(),
            destination = %self.download_dir.display(),
            "metadata received; starting transfer"
        );
        self.engine
            .begin_transfer(metainfo, &self.download_dir)
            .await
            .map_err(SessionError::engine("begin_transfer"))
    }

    async fn on_piece_finished(
        &mut self,
        handle: &SharedHandle,
        piece_index: u32,
    ) -> SessionResult<()> {
        if !self.buffer.mark_downloaded(piece_index) {
            warn!(
                torrent_id = %handle.id(),
                piece_index,
                "finished piece outside buffer window; discarding"
            );
            return Ok(());
        }
        self.push_priorities(handle).await?;

        let status = self.snapshot(handle, None).await?;
        self.notify(EventKind::PieceFinished, &status, |l, s| {
            l.on_piece_finished(s);
        });
        Ok(())
    }

    async fn forward(
        &self,
        handle: &SharedHandle,
        message: Option<String>,
        kind: EventKind,
        callback: impl FnOnce(&dyn SessionListener, &SessionStatus),
    ) -> SessionResult<()> {
        let status = self.snapshot(handle, message).await?;
        self.notify(kind, &status, callback);
        Ok(())
    }

    async fn push_priorities(&self, handle: &SharedHandle) -> SessionResult<()> {
        let plan = self.buffer.priority_assignment();
        if plan.is_empty() {
            return Ok(());
        }
        handle
            .set_piece_priorities(plan.entries())
            .await
            .map_err(SessionError::engine("set_piece_priorities"))
    }

    async fn snapshot(
        &self,
        handle: &SharedHandle,
        message: Option<String>,
    ) -> SessionResult<SessionStatus> {
        let transfer = handle
            .status()
            .await
            .map_err(SessionError::engine("snapshot"))?;
        Ok(SessionStatus::capture(
            transfer,
            &self.locations,
            &self.buffer,
            message,
        ))
    }

    fn notify(
        &self,
        kind: EventKind,
        status: &SessionStatus,
        callback: impl FnOnce(&dyn SessionListener, &SessionStatus),
    ) {
        let Some(listener) = self.listener.current() else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(listener.as_ref(), status))).is_err() {
            warn!(event = %kind, "session listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::PiecePriority;
    use std::sync::Mutex;

    use reel_test_support::fixtures::{SAMPLE_WINDOW_FIRST, SAMPLE_WINDOW_LAST};
    use reel_test_support::mocks::{StubEngine, StubHandle};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(EventKind, SessionStatus)>>,
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.seen
                .lock()
                .map(|seen| seen.iter().map(|(kind, _)| *kind).collect())
                .unwrap_or_default()
        }

        fn last(&self) -> Option<SessionStatus> {
            self.seen
                .lock()
                .ok()
                .and_then(|seen| seen.last().map(|(_, status)| status.clone()))
        }

        fn record(&self, kind: EventKind, status: &SessionStatus) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((kind, status.clone()));
            }
        }
    }

    impl SessionListener for Recorder {
        fn on_add_torrent(&self, status: &SessionStatus) {
            self.record(EventKind::TorrentAdded, status);
        }
        fn on_piece_finished(&self, status: &SessionStatus) {
            self.record(EventKind::PieceFinished, status);
        }
        fn on_torrent_error(&self, status: &SessionStatus) {
            self.record(EventKind::TorrentError, status);
        }
        fn on_torrent_finished(&self, status: &SessionStatus) {
            self.record(EventKind::TorrentFinished, status);
        }
    }

    struct Panicking;

    impl SessionListener for Panicking {
        fn on_torrent_finished(&self, _status: &SessionStatus) {
            panic!("listener bug");
        }
    }

    fn router(listener: Option<Arc<dyn SessionListener>>) -> (EventRouter, Arc<ReadinessGate>) {
        router_with(Arc::new(StubEngine::new()), listener)
    }

    fn router_with(
        engine: Arc<StubEngine>,
        listener: Option<Arc<dyn SessionListener>>,
    ) -> (EventRouter, Arc<ReadinessGate>) {
        let gate = Arc::new(ReadinessGate::new());
        let slot = ListenerSlot::default();
        slot.replace(listener);
        let router = EventRouter::new(
            engine,
            Arc::clone(&gate),
            slot,
            PathBuf::from("/downloads"),
            8,
        );
        (router, gate)
    }

    fn shared(handle: &Arc<StubHandle>) -> SharedHandle {
        handle.clone()
    }

    #[tokio::test]
    async fn unhandled_events_are_ignored() {
        let recorder = Arc::new(Recorder::default());
        let (mut router, _gate) = router(Some(recorder.clone()));
        router
            .dispatch(EngineEvent::Unhandled {
                kind: "tracker_reply".into(),
            })
            .await;
        assert!(recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_event_releases_pending_waiters() -> anyhow::Result<()> {
        let (mut router, gate) = router(None);
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait(10).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        router.dispatch(EngineEvent::DhtBootstrap).await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter).await??;
        assert!(!gate.is_ready(10));
        Ok(())
    }

    #[tokio::test]
    async fn stats_event_feeds_the_gate() {
        let engine = Arc::new(StubEngine::new());
        let (mut router, gate) = router_with(Arc::clone(&engine), None);

        engine.set_dht_nodes(7);
        router.dispatch(EngineEvent::DhtStats).await;
        assert_eq!(gate.node_count(), 7);
        assert!(!gate.is_ready(10));

        engine.set_dht_nodes(11);
        router.dispatch(EngineEvent::DhtStats).await;
        assert!(gate.is_ready(10));
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_the_next_event() -> anyhow::Result<()> {
        let recorder = Arc::new(Recorder::default());
        let (mut router, _gate) = router(Some(recorder.clone()));
        let handle = Arc::new(StubHandle::streaming_sample());
        handle.fail_piece_priorities(true);

        router
            .dispatch(EngineEvent::TorrentAdded {
                handle: shared(&handle),
            })
            .await;
        assert!(recorder.kinds().is_empty());
        assert!(!handle.is_resumed());

        router
            .dispatch(EngineEvent::TorrentError {
                handle: shared(&handle),
                message: "disk full".into(),
            })
            .await;
        assert_eq!(recorder.kinds(), vec![EventKind::TorrentError]);
        let status = recorder
            .last()
            .ok_or_else(|| anyhow::anyhow!("missing status"))?;
        assert_eq!(status.message.as_deref(), Some("disk full"));
        Ok(())
    }

    #[tokio::test]
    async fn panicking_listener_is_contained() {
        let engine = Arc::new(StubEngine::new());
        let (mut router, gate) = router_with(Arc::clone(&engine), Some(Arc::new(Panicking)));
        let handle = Arc::new(StubHandle::streaming_sample());

        router
            .dispatch(EngineEvent::TorrentFinished {
                handle: shared(&handle),
            })
            .await;
        engine.set_dht_nodes(3);
        router.dispatch(EngineEvent::DhtStats).await;
        assert!(gate.is_ready(3));
    }

    #[tokio::test]
    async fn panicking_handle_does_not_end_the_dispatch_loop() -> anyhow::Result<()> {
        let recorder = Arc::new(Recorder::default());
        let (router, _gate) = router(Some(recorder.clone()));
        let (sink, events) = reel_core::EventSink::channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = spawn(router, events, shutdown_rx);

        let broken = Arc::new(StubHandle::streaming_sample());
        broken.panic_on_status(true);
        let healthy = Arc::new(StubHandle::streaming_sample());
        assert!(sink.deliver(EngineEvent::TorrentFinished {
            handle: shared(&broken),
        }));
        assert!(sink.deliver(EngineEvent::TorrentFinished {
            handle: shared(&healthy),
        }));

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while recorder.kinds().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await?;
        assert_eq!(recorder.kinds(), vec![EventKind::TorrentFinished]);
        assert!(!sink.is_closed());

        let _ = shutdown.send(());
        task.await?;
        Ok(())
    }

    #[tokio::test]
    async fn transfer_without_metadata_is_resumed_unselected() {
        let recorder = Arc::new(Recorder::default());
        let (mut router, _gate) = router(Some(recorder.clone()));
        let handle = Arc::new(StubHandle::awaiting_metadata());

        router
            .dispatch(EngineEvent::TorrentAdded {
                handle: shared(&handle),
            })
            .await;
        assert_eq!(recorder.kinds(), vec![EventKind::TorrentAdded]);
        assert!(handle.is_resumed());
        assert!(router.buffer.bounds().is_none());
        assert_eq!(handle.piece_priority_pushes(), 0);
    }

    #[tokio::test]
    async fn out_of_window_piece_is_discarded() -> anyhow::Result<()> {
        let recorder = Arc::new(Recorder::default());
        let (mut router, _gate) = router(Some(recorder.clone()));
        let handle = Arc::new(StubHandle::streaming_sample());

        router
            .dispatch(EngineEvent::TorrentAdded {
                handle: shared(&handle),
            })
            .await;
        assert_eq!(router.buffer.start_index(), Some(SAMPLE_WINDOW_FIRST));
        assert_eq!(router.buffer.end_index(), Some(SAMPLE_WINDOW_LAST));
        let pushes = handle.piece_priority_pushes();

        router
            .dispatch(EngineEvent::PieceFinished {
                handle: shared(&handle),
                piece_index: SAMPLE_WINDOW_LAST + 50,
            })
            .await;
        assert_eq!(router.buffer.downloaded_count(), 0);
        assert_eq!(handle.piece_priority_pushes(), pushes);
        assert_eq!(recorder.kinds(), vec![EventKind::TorrentAdded]);

        router
            .dispatch(EngineEvent::PieceFinished {
                handle: shared(&handle),
                piece_index: SAMPLE_WINDOW_FIRST,
            })
            .await;
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::TorrentAdded, EventKind::PieceFinished]
        );
        assert_eq!(handle.piece_priority_pushes(), pushes + 1);
        assert_eq!(
            handle.piece_priority(SAMPLE_WINDOW_FIRST + 8),
            Some(PiecePriority::Top)
        );
        let status = recorder
            .last()
            .ok_or_else(|| anyhow::anyhow!("missing status"))?;
        assert_eq!(status.buffer.downloaded_count(), 1);
        assert_eq!(status.buffer.buffered_pieces(), 1);
        Ok(())
    }
}
