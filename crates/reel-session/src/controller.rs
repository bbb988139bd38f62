//! Session lifecycle and the caller-facing operations.
//!
//! # Design
//! - `start` registers an event sink with the engine and spawns the dispatch task.
//! - Commands fail with [`SessionError::Stopped`] once `stop` has run.
//! - `stop` detaches the sink, drains the dispatch task, then stops the engine.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reel_core::{EngineError, EventSink, ListenerId, StreamEngine};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::listener::{ListenerSlot, SessionListener};
use crate::options::{EffectiveSessionOptions, SessionOptions};
use crate::readiness::ReadinessGate;
use crate::router::{self, EventRouter};

/// Lifecycle state tracked by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting commands and dispatching events.
    Started,
    /// Engine paused; events still dispatched.
    Paused,
    /// Terminal; commands are rejected.
    Stopped,
}

impl SessionState {
    /// Machine-friendly name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

struct Dispatcher {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Lifecycle {
    state: SessionState,
    dispatcher: Option<Dispatcher>,
}

/// Streams the largest file of a transfer by steering engine piece priorities.
pub struct SessionController {
    engine: Arc<dyn StreamEngine>,
    gate: Arc<ReadinessGate>,
    listener: ListenerSlot,
    options: SessionOptions,
    sink_id: ListenerId,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionController {
    /// Normalise `options`, wire the dispatch task to `engine`, and start the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] when the engine refuses to start; the event sink is
    /// detached again before returning.
    pub async fn start(
        engine: Arc<dyn StreamEngine>,
        options: SessionOptions,
    ) -> SessionResult<Self> {
        let EffectiveSessionOptions { options, warnings } = options.normalize();
        for warning in &warnings {
            warn!(warning = %warning, "session option adjusted");
        }

        let gate = Arc::new(ReadinessGate::new());
        let listener = ListenerSlot::default();
        let (sink, events) = EventSink::channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let router = EventRouter::new(
            Arc::clone(&engine),
            Arc::clone(&gate),
            listener.clone(),
            options.download_dir.clone(),
            options.look_ahead,
        );
        let task = router::spawn(router, events, shutdown_rx);
        let sink_id = engine.add_listener(sink);

        if let Err(source) = engine.start(&options.engine).await {
            engine.remove_listener(sink_id);
            Dispatcher { shutdown, task }.finish().await;
            return Err(SessionError::Engine {
                operation: "start",
                source,
            });
        }

        info!(
            listener = %sink_id,
            download_dir = %options.download_dir.display(),
            look_ahead = options.look_ahead,
            min_dht_nodes = options.min_dht_nodes,
            "streaming session started"
        );
        Ok(Self {
            engine,
            gate,
            listener,
            options,
            sink_id,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Started,
                dispatcher: Some(Dispatcher { shutdown, task }),
            }),
        })
    }

    /// Wait for DHT readiness, then ask the engine to resolve a percent-encoded descriptor.
    ///
    /// Resolution results arrive through the listener; `timeout` bounds the engine's metadata
    /// lookup, not the readiness wait. Decoding is plain RFC 3986 percent-decoding, so `+` is
    /// kept as a literal `+`. A synchronous rejection by the engine is returned here and does
    /// not reach `on_metadata_failed`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Stopped`] if the session is or becomes stopped, even when the
    /// engine call then fails,
    /// [`SessionError::InvalidDescriptor`] when the descriptor does not decode, or
    /// [`SessionError::Engine`] when the engine rejects it.
    pub async fn download_magnet(&self, descriptor: &str, timeout: Duration) -> SessionResult<()> {
        self.ensure_active("download_magnet")?;
        let decoded = urlencoding::decode(descriptor)
            .map_err(|source| SessionError::InvalidDescriptor { source })?;

        match self.engine.stats().await {
            Ok(stats) => self.gate.report_node_count(stats.dht_nodes),
            Err(err) => debug!(error = %err, "engine stats unavailable; waiting for dht events"),
        }
        let threshold = self.options.min_dht_nodes;
        if !self.gate.is_ready(threshold) {
            info!(
                threshold,
                dht_nodes = self.gate.node_count(),
                "waiting for dht readiness"
            );
        }
        self.gate.wait(threshold).await;
        self.ensure_active("download_magnet")?;

        debug!(descriptor = %decoded, "resolving descriptor");
        self.engine
            .resolve(&decoded, timeout)
            .await
            .map_err(|source| self.rejected("download_magnet", source))
    }

    /// Replace the listener; `None` silences callbacks.
    pub fn set_listener(&self, listener: Option<Arc<dyn SessionListener>>) {
        self.listener.replace(listener);
    }

    /// Pause the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Stopped`] after `stop`, or [`SessionError::Engine`].
    pub async fn pause(&self) -> SessionResult<()> {
        self.ensure_active("pause")?;
        self.engine
            .pause()
            .await
            .map_err(|source| self.rejected("pause", source))?;
        self.transition(SessionState::Paused);
        Ok(())
    }

    /// Resume the engine after a pause.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Stopped`] after `stop`, or [`SessionError::Engine`].
    pub async fn resume(&self) -> SessionResult<()> {
        self.ensure_active("resume")?;
        self.engine
            .resume()
            .await
            .map_err(|source| self.rejected("resume", source))?;
        self.transition(SessionState::Started);
        Ok(())
    }

    /// Detach from the engine, drain the dispatch task, and stop the engine.
    ///
    /// Calling `stop` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] when the engine fails to stop; the session is
    /// stopped regardless.
    pub async fn stop(&self) -> SessionResult<()> {
        let dispatcher = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state == SessionState::Stopped {
                return Ok(());
            }
            lifecycle.state = SessionState::Stopped;
            lifecycle.dispatcher.take()
        };

        self.engine.remove_listener(self.sink_id);
        self.listener.replace(None);
        self.gate.release();
        if let Some(dispatcher) = dispatcher {
            dispatcher.finish().await;
        }

        self.engine
            .stop()
            .await
            .map_err(SessionError::engine("stop"))?;
        info!(listener = %self.sink_id, "streaming session stopped");
        Ok(())
    }

    /// Whether the engine reports a paused session.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.engine.is_paused()
    }

    /// Whether the engine is running and the session has not been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() != SessionState::Stopped && self.engine.is_running()
    }

    /// Local lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    /// Effective options after guard rails.
    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Destination directory handed to the engine for transfers.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.options.download_dir
    }

    /// Readiness gate shared with the dispatch task.
    #[must_use]
    pub fn readiness(&self) -> &ReadinessGate {
        &self.gate
    }

    fn ensure_active(&self, operation: &'static str) -> SessionResult<()> {
        if self.state() == SessionState::Stopped {
            return Err(SessionError::Stopped { operation });
        }
        Ok(())
    }

    /// A command that fails because `stop` raced it reports `Stopped`, not the engine error.
    fn rejected(&self, operation: &'static str, source: EngineError) -> SessionError {
        if self.state() == SessionState::Stopped {
            debug!(operation, error = %source, "engine rejected command after stop");
            return SessionError::Stopped { operation };
        }
        SessionError::Engine { operation, source }
    }

    fn transition(&self, next: SessionState) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Stopped && lifecycle.state != next {
            debug!(from = %lifecycle.state, to = %next, "session state changed");
            lifecycle.state = next;
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if lifecycle.state == SessionState::Stopped {
            return;
        }
        lifecycle.state = SessionState::Stopped;
        if let Some(dispatcher) = lifecycle.dispatcher.take() {
            drop(dispatcher.signal());
        }
        self.engine.remove_listener(self.sink_id);
        self.gate.release();
        debug!(listener = %self.sink_id, "session dropped without stop; engine left running");
    }
}

impl Dispatcher {
    fn signal(self) -> JoinHandle<()> {
        if self.shutdown.send(()).is_err() {
            debug!("session dispatch loop already stopped");
        }
        self.task
    }

    async fn finish(self) {
        if let Err(err) = self.signal().await {
            warn!(error = %err, "session dispatch task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_test_support::mocks::StubEngine;

    #[tokio::test]
    async fn engine_failure_after_stop_reports_stopped() -> anyhow::Result<()> {
        let session =
            SessionController::start(Arc::new(StubEngine::new()), SessionOptions::default())
                .await?;
        let rejected = || EngineError::NotRunning {
            operation: "resolve",
        };

        assert!(matches!(
            session.rejected("download_magnet", rejected()),
            SessionError::Engine {
                operation: "download_magnet",
                ..
            }
        ));

        session.stop().await?;
        assert!(matches!(
            session.rejected("download_magnet", rejected()),
            SessionError::Stopped {
                operation: "download_magnet"
            }
        ));
        Ok(())
    }
}
