//! Channel-backed sink the engine uses to deliver events to a session.
//!
//! # Design
//! - Delivery never blocks the engine's callback thread (unbounded channel).
//! - The sink holds no reference to its consumer; dropping every clone closes the stream.

use std::fmt::{self, Display, Formatter};

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::EngineEvent;

/// Registration token returned by `StreamEngine::add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl Display for ListenerId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "listener-{}", self.0)
    }
}

/// Cloneable event sink handed to the engine.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    /// Create a sink and the receiving half consumed by the session.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Deliver an event; returns `false` when the consumer has gone away.
    pub fn deliver(&self, event: EngineEvent) -> bool {
        match self.sender.send(event) {
            Ok(()) => true,
            Err(err) => {
                debug!(event = %err.0.kind(), "event sink closed; dropping engine event");
                false
            }
        }
    }

    /// Whether the consuming side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
