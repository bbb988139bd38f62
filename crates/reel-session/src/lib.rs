#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Play-while-downloading session built on top of a [`reel_core::StreamEngine`].
//!
//! The controller waits for DHT readiness, resolves a descriptor, isolates the largest file,
//! and keeps a sliding window of pieces at top priority so playback can start before the
//! transfer completes. Every lifecycle event reaches the caller as a [`SessionStatus`].

pub mod buffer;
pub mod controller;
pub mod error;
pub mod listener;
pub mod options;
pub mod readiness;
mod router;
pub mod status;

pub use buffer::{BufferWindow, DEFAULT_LOOK_AHEAD, PriorityAssignment};
pub use controller::{SessionController, SessionState};
pub use error::{SessionError, SessionResult};
pub use listener::SessionListener;
pub use options::{
    DEFAULT_MIN_DHT_NODES, EffectiveSessionOptions, MAX_LOOK_AHEAD, SessionOptions,
};
pub use readiness::ReadinessGate;
pub use status::{ResolvedLocations, SessionStatus};
