//! Sliding playback window over the pieces of the selected file.
//!
//! # Design
//! - Pure data; the dispatch task is the only owner and mutator.
//! - Top priority always goes to the lowest-index undownloaded pieces, at most `look_ahead`.
//! - Downloaded pieces are omitted from assignments and keep whatever priority the engine has.

use std::collections::BTreeSet;

use reel_core::{PieceAssignment, PiecePriority, PieceSpan};
use serde::Serialize;
use tracing::debug;

use crate::error::{SessionError, SessionResult};

/// Default number of pieces kept at top priority ahead of playback.
pub const DEFAULT_LOOK_AHEAD: usize = 8;

/// Playable region of the selected file plus download bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferWindow {
    bounds: Option<PieceSpan>,
    look_ahead: usize,
    downloaded: BTreeSet<u32>,
}

impl BufferWindow {
    /// Window over `first..=last` with nothing downloaded.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidWindow`] when `first > last`.
    pub fn new(first: u32, last: u32, look_ahead: usize) -> SessionResult<Self> {
        if first > last {
            return Err(SessionError::InvalidWindow { first, last });
        }
        Ok(Self {
            bounds: Some(PieceSpan { first, last }),
            look_ahead,
            downloaded: BTreeSet::new(),
        })
    }

    /// Pre-selection window; nothing can be prioritised yet.
    #[must_use]
    pub const fn unbounded(look_ahead: usize) -> Self {
        Self {
            bounds: None,
            look_ahead,
            downloaded: BTreeSet::new(),
        }
    }

    /// Inclusive bounds, or `None` before file selection.
    #[must_use]
    pub const fn bounds(&self) -> Option<PieceSpan> {
        self.bounds
    }

    /// First piece of the playable region.
    #[must_use]
    pub fn start_index(&self) -> Option<u32> {
        self.bounds.map(|span| span.first)
    }

    /// Last piece of the playable region (inclusive).
    #[must_use]
    pub fn end_index(&self) -> Option<u32> {
        self.bounds.map(|span| span.last)
    }

    /// Maximum number of pieces held at top priority.
    #[must_use]
    pub const fn look_ahead(&self) -> usize {
        self.look_ahead
    }

    /// Whether `index` lies inside the window.
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.bounds
            .is_some_and(|span| (span.first..=span.last).contains(&index))
    }

    /// Record a completed piece; out-of-window indices are ignored.
    ///
    /// Returns whether the index was recorded.
    pub fn mark_downloaded(&mut self, index: u32) -> bool {
        if !self.contains(index) {
            debug!(
                piece_index = index,
                bounds = ?self.bounds,
                "piece outside buffer window; ignoring"
            );
            return false;
        }
        self.downloaded.insert(index);
        true
    }

    /// Whether `index` has been recorded as downloaded.
    #[must_use]
    pub fn is_downloaded(&self, index: u32) -> bool {
        self.downloaded.contains(&index)
    }

    /// Number of downloaded pieces inside the window.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    /// First undownloaded piece, i.e. where playback would stall.
    #[must_use]
    pub fn playback_head(&self) -> Option<u32> {
        self.pending().next()
    }

    /// Length of the contiguous downloaded run starting at `start_index`.
    #[must_use]
    pub fn buffered_pieces(&self) -> usize {
        self.bounds.map_or(0, |span| {
            (span.first..=span.last)
                .take_while(|index| self.downloaded.contains(index))
                .count()
        })
    }

    /// Whether every piece of the window has been downloaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bounds.is_some_and(|span| {
            usize::try_from(span.piece_count()).is_ok_and(|count| self.downloaded.len() == count)
        })
    }

    /// Priorities to push to the engine for the current window state.
    #[must_use]
    pub fn priority_assignment(&self) -> PriorityAssignment {
        let entries = self
            .pending()
            .enumerate()
            .map(|(position, index)| PieceAssignment {
                index,
                priority: if position < self.look_ahead {
                    PiecePriority::Top
                } else {
                    PiecePriority::Normal
                },
            })
            .collect();
        PriorityAssignment {
            bounds: self.bounds,
            entries,
        }
    }

    fn pending(&self) -> impl Iterator<Item = u32> + '_ {
        self.bounds
            .into_iter()
            .flat_map(|span| span.first..=span.last)
            .filter(|index| !self.downloaded.contains(index))
    }
}

/// Priority plan derived from a [`BufferWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityAssignment {
    bounds: Option<PieceSpan>,
    entries: Vec<PieceAssignment>,
}

impl PriorityAssignment {
    /// Assignments for undownloaded in-window pieces, in ascending index order.
    #[must_use]
    pub fn entries(&self) -> &[PieceAssignment] {
        &self.entries
    }

    /// Priority for a single piece.
    ///
    /// Pieces outside the window report [`PiecePriority::Ignore`]; downloaded pieces report
    /// `None` because they are left at the engine's current priority.
    #[must_use]
    pub fn priority_of(&self, index: u32) -> Option<PiecePriority> {
        let inside = self
            .bounds
            .is_some_and(|span| (span.first..=span.last).contains(&index));
        if !inside {
            return Some(PiecePriority::Ignore);
        }
        self.entries
            .binary_search_by_key(&index, |entry| entry.index)
            .ok()
            .and_then(|position| self.entries.get(position))
            .map(|entry| entry.priority)
    }

    /// Indices currently at top priority.
    pub fn top_priority(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.priority == PiecePriority::Top)
            .map(|entry| entry.index)
    }

    /// Whether there is nothing to push.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
