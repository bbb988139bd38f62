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

//! Engine-agnostic transfer interfaces and DTOs shared by the streaming session.
//!
//! Layout: `model` (DTOs and priorities), `event` (tagged engine events), `sink` (event
//! delivery channel), `layout` (file/piece geometry helpers), `service` (engine traits),
//! `error` (engine error taxonomy).

pub mod error;
pub mod event;
pub mod layout;
pub mod model;
pub mod service;
pub mod sink;

pub use error::{EngineError, EngineResult};
pub use event::{EngineEvent, EventKind, SharedHandle};
pub use layout::{PieceSpan, isolate_file, largest_file};
pub use model::{
    EngineParams, FilePriority, PieceAssignment, PiecePriority, SessionStats, TorrentFile,
    TorrentMetadata, TorrentMetainfo, TransferProgress, TransferRates, TransferState,
    TransferStatus,
};
pub use service::{StreamEngine, TransferHandle};
pub use sink::{EventSink, ListenerId};
