//! File and piece geometry helpers used for single-file selection.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::model::{FilePriority, TorrentFile, TorrentMetadata};

/// Inclusive range of piece indices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PieceSpan {
    /// First piece index.
    pub first: u32,
    /// Last piece index (inclusive).
    pub last: u32,
}

impl PieceSpan {
    /// Pieces touched by every non-ignored, non-empty file.
    ///
    /// Returns `None` when nothing is selected or the geometry is unusable.
    #[must_use]
    pub fn covering(files: &[TorrentFile], metadata: &TorrentMetadata) -> Option<Self> {
        if metadata.piece_length == 0 || metadata.piece_count == 0 {
            return None;
        }
        let max_index = metadata.piece_count - 1;

        files
            .iter()
            .filter(|file| !file.priority.is_ignored() && file.size_bytes > 0)
            .map(|file| {
                let end = file.offset_bytes.saturating_add(file.size_bytes - 1);
                Self {
                    first: piece_at(file.offset_bytes, metadata.piece_length).min(max_index),
                    last: piece_at(end, metadata.piece_length).min(max_index),
                }
            })
            .reduce(|span, next| Self {
                first: span.first.min(next.first),
                last: span.last.max(next.last),
            })
    }

    /// Number of pieces in the span.
    #[must_use]
    pub const fn piece_count(&self) -> u32 {
        self.last - self.first + 1
    }
}

fn piece_at(offset: u64, piece_length: u64) -> u32 {
    u32::try_from(offset / piece_length).unwrap_or(u32::MAX)
}

/// Largest file of the transfer; ties go to the lowest index.
#[must_use]
pub fn largest_file(files: &[TorrentFile]) -> Option<&TorrentFile> {
    files
        .iter()
        .max_by_key(|file| (file.size_bytes, Reverse(file.index)))
}

/// Positional priorities that keep only the file at `index`.
#[must_use]
pub fn isolate_file(files: &[TorrentFile], index: u32) -> Vec<FilePriority> {
    files
        .iter()
        .map(|file| {
            if file.index == index {
                FilePriority::Normal
            } else {
                FilePriority::Ignore
            }
        })
        .collect()
}
