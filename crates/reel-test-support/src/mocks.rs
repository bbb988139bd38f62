//! In-memory engine and transfer handle for driving a session without a network.
//!
//! Both doubles record every command they receive so tests can assert on what the session
//! asked for; events are injected with [`StubEngine::emit`].

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reel_core::{
    EngineError, EngineEvent, EngineParams, EngineResult, EventSink, FilePriority, ListenerId,
    PieceAssignment, PiecePriority, SessionStats, StreamEngine, TorrentFile, TorrentMetadata,
    TorrentMetainfo, TransferHandle, TransferProgress, TransferRates, TransferState,
    TransferStatus,
};
use uuid::Uuid;

use crate::fixtures::{sample_files, sample_metadata, sample_metainfo};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct EngineState {
    running: bool,
    paused: bool,
    started_with: Option<EngineParams>,
    stop_calls: usize,
    sinks: HashMap<ListenerId, EventSink>,
    next_listener: u64,
    dht_nodes: u32,
    fail_resolve: bool,
    resolved: Vec<(String, Duration)>,
    transfers: Vec<(TorrentMetainfo, PathBuf)>,
}

/// Recording [`StreamEngine`] double.
#[derive(Default)]
pub struct StubEngine {
    state: Mutex<EngineState>,
}

impl StubEngine {
    /// Engine that has not been started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every registered sink; returns how many accepted it.
    pub fn emit(&self, event: &EngineEvent) -> usize {
        lock(&self.state)
            .sinks
            .values()
            .filter(|sink| sink.deliver(event.clone()))
            .count()
    }

    /// Set the node count reported by `stats`.
    pub fn set_dht_nodes(&self, nodes: u32) {
        lock(&self.state).dht_nodes = nodes;
    }

    /// Make subsequent `resolve` calls fail synchronously.
    pub fn fail_resolve(&self, fail: bool) {
        lock(&self.state).fail_resolve = fail;
    }

    /// Descriptors passed to `resolve`, with their timeouts.
    #[must_use]
    pub fn resolved(&self) -> Vec<(String, Duration)> {
        lock(&self.state).resolved.clone()
    }

    /// Metainfo and destinations passed to `begin_transfer`.
    #[must_use]
    pub fn transfers(&self) -> Vec<(TorrentMetainfo, PathBuf)> {
        lock(&self.state).transfers.clone()
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.state).sinks.len()
    }

    /// Parameters passed to the last `start`.
    #[must_use]
    pub fn started_with(&self) -> Option<EngineParams> {
        lock(&self.state).started_with.clone()
    }

    /// How many times `stop` was called.
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        lock(&self.state).stop_calls
    }

    fn ensure_running(&self, operation: &'static str) -> EngineResult<()> {
        if lock(&self.state).running {
            Ok(())
        } else {
            Err(EngineError::NotRunning { operation })
        }
    }
}

#[async_trait]
impl StreamEngine for StubEngine {
    async fn start(&self, params: &EngineParams) -> EngineResult<()> {
        let mut state = lock(&self.state);
        state.running = true;
        state.paused = false;
        state.started_with = Some(params.clone());
        Ok(())
    }

    async fn stop(&self) -> EngineResult<()> {
        let mut state = lock(&self.state);
        state.running = false;
        state.stop_calls += 1;
        Ok(())
    }

    async fn pause(&self) -> EngineResult<()> {
        self.ensure_running("pause")?;
        lock(&self.state).paused = true;
        Ok(())
    }

    async fn resume(&self) -> EngineResult<()> {
        self.ensure_running("resume")?;
        lock(&self.state).paused = false;
        Ok(())
    }

    fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    fn add_listener(&self, sink: EventSink) -> ListenerId {
        let mut state = lock(&self.state);
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.sinks.insert(id, sink);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        lock(&self.state).sinks.remove(&id);
    }

    async fn resolve(&self, descriptor: &str, timeout: Duration) -> EngineResult<()> {
        self.ensure_running("resolve")?;
        let mut state = lock(&self.state);
        if state.fail_resolve {
            return Err(EngineError::InvalidDescriptor {
                reason: "descriptor rejected by stub",
            });
        }
        state.resolved.push((descriptor.to_string(), timeout));
        Ok(())
    }

    async fn begin_transfer(
        &self,
        metainfo: TorrentMetainfo,
        destination: &Path,
    ) -> EngineResult<()> {
        self.ensure_running("begin_transfer")?;
        lock(&self.state)
            .transfers
            .push((metainfo, destination.to_path_buf()));
        Ok(())
    }

    async fn stats(&self) -> EngineResult<SessionStats> {
        Ok(SessionStats {
            dht_nodes: lock(&self.state).dht_nodes,
        })
    }
}

#[derive(Debug, Clone)]
struct HandleState {
    name: String,
    files: Vec<TorrentFile>,
    metadata: Option<TorrentMetadata>,
    metainfo: Option<TorrentMetainfo>,
    save_path: PathBuf,
    transfer_state: TransferState,
    piece_priorities: BTreeMap<u32, PiecePriority>,
    piece_pushes: usize,
    fail_piece_priorities: bool,
    panic_on_status: bool,
    removed: bool,
    resumed: bool,
}

/// Recording [`TransferHandle`] double.
#[derive(Debug)]
pub struct StubHandle {
    id: Uuid,
    state: Mutex<HandleState>,
}

impl StubHandle {
    /// Handle over `files`; `metadata` is `None` while resolution is pending.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        files: Vec<TorrentFile>,
        metadata: Option<TorrentMetadata>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(HandleState {
                name: name.into(),
                files,
                metadata,
                metainfo: None,
                save_path: PathBuf::from("downloads"),
                transfer_state: TransferState::Downloading,
                piece_priorities: BTreeMap::new(),
                piece_pushes: 0,
                fail_piece_priorities: false,
                panic_on_status: false,
                removed: false,
                resumed: false,
            }),
        }
    }

    /// Sample transfer with metadata and metainfo resolved.
    #[must_use]
    pub fn streaming_sample() -> Self {
        Self::new("sample", sample_files(), Some(sample_metadata()))
            .with_metainfo(sample_metainfo())
    }

    /// Sample transfer still fetching metadata.
    #[must_use]
    pub fn awaiting_metadata() -> Self {
        Self::new("sample", Vec::new(), None).with_state(TransferState::FetchingMetadata)
    }

    /// Replace the save path.
    #[must_use]
    pub fn with_save_path(self, path: impl Into<PathBuf>) -> Self {
        self.update(|state| state.save_path = path.into())
    }

    /// Replace the metainfo returned once metadata is known.
    #[must_use]
    pub fn with_metainfo(self, metainfo: TorrentMetainfo) -> Self {
        self.update(|state| state.metainfo = Some(metainfo))
    }

    /// Replace the reported transfer state.
    #[must_use]
    pub fn with_state(self, transfer_state: TransferState) -> Self {
        self.update(|state| state.transfer_state = transfer_state)
    }

    /// Make subsequent `set_piece_priorities` calls fail.
    pub fn fail_piece_priorities(&self, fail: bool) {
        lock(&self.state).fail_piece_priorities = fail;
    }

    /// Make `status` panic, as a buggy native binding would.
    pub fn panic_on_status(&self, panic: bool) {
        lock(&self.state).panic_on_status = panic;
    }

    /// Drop the transfer from the engine; later handle calls fail with `TransferNotFound`.
    pub fn mark_removed(&self) {
        lock(&self.state).removed = true;
    }

    /// Whether `resume` has been called.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        lock(&self.state).resumed
    }

    /// Current file priorities, positionally.
    #[must_use]
    pub fn file_priorities(&self) -> Vec<FilePriority> {
        lock(&self.state)
            .files
            .iter()
            .map(|file| file.priority)
            .collect()
    }

    /// Priority last applied to `index`, if any.
    #[must_use]
    pub fn piece_priority(&self, index: u32) -> Option<PiecePriority> {
        lock(&self.state).piece_priorities.get(&index).copied()
    }

    /// Number of successful `set_piece_priorities` calls.
    #[must_use]
    pub fn piece_priority_pushes(&self) -> usize {
        lock(&self.state).piece_pushes
    }

    fn live(&self) -> EngineResult<MutexGuard<'_, HandleState>> {
        let state = lock(&self.state);
        if state.removed {
            return Err(EngineError::TransferNotFound {
                transfer_id: self.id,
            });
        }
        Ok(state)
    }

    fn update(self, apply: impl FnOnce(&mut HandleState)) -> Self {
        let Self { id, state } = self;
        let mut state = state.into_inner().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        Self {
            id,
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl TransferHandle for StubHandle {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn status(&self) -> EngineResult<TransferStatus> {
        let state = self.live()?;
        assert!(!state.panic_on_status, "stub status configured to panic");
        Ok(TransferStatus {
            id: self.id,
            name: Some(state.name.clone()),
            state: state.transfer_state.clone(),
            progress: TransferProgress {
                bytes_downloaded: 0,
                bytes_total: state.files.iter().map(|file| file.size_bytes).sum(),
            },
            rates: TransferRates::default(),
            peers: 0,
            seeds: 0,
        })
    }

    async fn metadata(&self) -> EngineResult<Option<TorrentMetadata>> {
        Ok(self.live()?.metadata.clone())
    }

    async fn files(&self) -> EngineResult<Vec<TorrentFile>> {
        Ok(self.live()?.files.clone())
    }

    async fn set_file_priorities(&self, priorities: &[FilePriority]) -> EngineResult<()> {
        let mut state = self.live()?;
        if priorities.len() != state.files.len() {
            return Err(EngineError::op_failed(
                "set_file_priorities",
                Some(self.id),
                io::Error::other("priority count does not match file count"),
            ));
        }
        for (file, priority) in state.files.iter_mut().zip(priorities) {
            file.priority = *priority;
        }
        Ok(())
    }

    async fn set_piece_priorities(&self, assignments: &[PieceAssignment]) -> EngineResult<()> {
        let mut state = self.live()?;
        if state.metadata.is_none() {
            return Err(EngineError::MetadataUnavailable {
                operation: "set_piece_priorities",
                transfer_id: self.id,
            });
        }
        if state.fail_piece_priorities {
            return Err(EngineError::op_failed(
                "set_piece_priorities",
                Some(self.id),
                io::Error::other("stub configured to fail"),
            ));
        }
        for assignment in assignments {
            state
                .piece_priorities
                .insert(assignment.index, assignment.priority);
        }
        state.piece_pushes += 1;
        Ok(())
    }

    async fn save_path(&self) -> EngineResult<PathBuf> {
        Ok(self.live()?.save_path.clone())
    }

    async fn metainfo(&self) -> EngineResult<Option<TorrentMetainfo>> {
        let state = self.live()?;
        if state.metadata.is_none() {
            return Ok(None);
        }
        Ok(state.metainfo.clone())
    }

    async fn resume(&self) -> EngineResult<()> {
        self.live()?.resumed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SAMPLE_LARGEST_FILE;
    use reel_core::isolate_file;

    #[tokio::test]
    async fn engine_records_commands_and_fans_out_events() -> anyhow::Result<()> {
        let engine = StubEngine::new();
        assert!(matches!(
            engine.resolve("magnet:?", Duration::from_secs(1)).await,
            Err(EngineError::NotRunning { .. })
        ));

        engine.start(&EngineParams::default()).await?;
        let (sink, mut events) = EventSink::channel();
        let id = engine.add_listener(sink);
        assert_eq!(engine.emit(&EngineEvent::DhtBootstrap), 1);
        assert!(events.recv().await.is_some());

        engine.resolve("magnet:?", Duration::from_secs(5)).await?;
        assert_eq!(engine.resolved().len(), 1);

        engine.remove_listener(id);
        assert_eq!(engine.emit(&EngineEvent::DhtStats), 0);
        engine.stop().await?;
        assert!(!engine.is_running());
        assert_eq!(engine.stop_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn handle_applies_file_priorities_positionally() -> anyhow::Result<()> {
        let handle = StubHandle::streaming_sample();
        let files = handle.files().await?;
        handle
            .set_file_priorities(&isolate_file(&files, SAMPLE_LARGEST_FILE))
            .await?;
        assert_eq!(
            handle.file_priorities(),
            vec![
                FilePriority::Ignore,
                FilePriority::Normal,
                FilePriority::Ignore
            ]
        );
        assert!(handle.set_file_priorities(&[]).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn handle_reports_missing_metadata_and_removed_transfers() -> anyhow::Result<()> {
        let pending = StubHandle::awaiting_metadata();
        let assignment = PieceAssignment {
            index: 0,
            priority: PiecePriority::Top,
        };
        assert!(matches!(
            pending.set_piece_priorities(&[assignment]).await,
            Err(EngineError::MetadataUnavailable {
                operation: "set_piece_priorities",
                ..
            })
        ));
        assert_eq!(pending.metainfo().await?, None);

        let handle = StubHandle::streaming_sample();
        handle.resume().await?;
        handle.mark_removed();
        assert!(matches!(
            handle.status().await,
            Err(EngineError::TransferNotFound { transfer_id }) if transfer_id == handle.id()
        ));
        assert!(handle.resume().await.is_err());
        Ok(())
    }
}
