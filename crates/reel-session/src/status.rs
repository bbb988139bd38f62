//! Snapshots handed to session listeners.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use reel_core::TransferStatus;
use serde::Serialize;

use crate::buffer::BufferWindow;

/// Filesystem locations captured when metadata arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedLocations {
    /// Directory the transfer saves into.
    pub save_location: Option<PathBuf>,
    /// Full path of the selected (largest) file.
    pub largest_file: Option<PathBuf>,
}

/// Immutable view of the session built for a single delivered event.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Directory the transfer saves into, once known.
    pub save_location: Option<PathBuf>,
    /// Full path of the selected file, once known.
    pub largest_file: Option<PathBuf>,
    /// Copy of the buffer window at capture time.
    pub buffer: BufferWindow,
    /// Engine-reported status of the transfer that triggered the event.
    pub transfer: TransferStatus,
    /// Engine message for failure events.
    pub message: Option<String>,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl SessionStatus {
    /// Capture a snapshot from the dispatch task's current state.
    #[must_use]
    pub fn capture(
        transfer: TransferStatus,
        locations: &ResolvedLocations,
        buffer: &BufferWindow,
        message: Option<String>,
    ) -> Self {
        Self {
            save_location: locations.save_location.clone(),
            largest_file: locations.largest_file.clone(),
            buffer: buffer.clone(),
            transfer,
            message,
            captured_at: Utc::now(),
        }
    }

    /// Share of the look-ahead already playable from the start of the file (0-100).
    ///
    /// Counts the contiguous run of downloaded pieces from the window start; a zero look-ahead
    /// reports 0.
    #[must_use]
    pub fn buffer_progress(&self) -> f64 {
        let look_ahead = self.buffer.look_ahead();
        if look_ahead == 0 {
            return 0.0;
        }
        let buffered = self.buffer.buffered_pieces().min(look_ahead);
        (to_f64(buffered) / to_f64(look_ahead)) * 100.0
    }

    /// Engine-reported completion of the whole transfer (0-100).
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        self.transfer.progress.percent_complete()
    }
}

fn to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::{TransferProgress, TransferRates, TransferState};

    fn sample_status() -> TransferStatus {
        TransferStatus {
            id: Default::default(),
            name: Some("demo".into()),
            state: TransferState::Downloading,
            progress: TransferProgress {
                bytes_downloaded: 25,
                bytes_total: 100,
            },
            rates: TransferRates::default(),
            peers: 3,
            seeds: 1,
        }
    }

    #[test]
    fn buffer_progress_tracks_contiguous_head() -> anyhow::Result<()> {
        let mut window = BufferWindow::new(0, 31, 4)?;
        let locations = ResolvedLocations::default();

        let empty = SessionStatus::capture(sample_status(), &locations, &window, None);
        assert!(empty.buffer_progress().abs() < f64::EPSILON);

        window.mark_downloaded(0);
        window.mark_downloaded(1);
        window.mark_downloaded(3);
        let partial = SessionStatus::capture(sample_status(), &locations, &window, None);
        assert!((partial.buffer_progress() - 50.0).abs() < f64::EPSILON);

        for index in 2..10 {
            window.mark_downloaded(index);
        }
        let full = SessionStatus::capture(sample_status(), &locations, &window, None);
        assert!((full.buffer_progress() - 100.0).abs() < f64::EPSILON);
        assert!((full.percent_complete() - 25.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn snapshot_copies_window_and_locations() -> anyhow::Result<()> {
        let mut window = BufferWindow::new(2, 6, 2)?;
        let locations = ResolvedLocations {
            save_location: Some(PathBuf::from("/downloads")),
            largest_file: Some(PathBuf::from("/downloads/movie.mkv")),
        };
        let status = SessionStatus::capture(
            sample_status(),
            &locations,
            &window,
            Some("tracker error".into()),
        );
        window.mark_downloaded(2);

        assert_eq!(status.buffer.downloaded_count(), 0);
        assert_eq!(status.largest_file, locations.largest_file);
        assert_eq!(status.message.as_deref(), Some("tracker error"));

        let json = serde_json::to_value(&status)?;
        assert_eq!(json["save_location"], "/downloads");
        Ok(())
    }
}
