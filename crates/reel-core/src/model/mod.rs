//! Core transfer domain types and DTOs shared across the workspace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// File-level download priority recognised by the engine.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    /// Do not download the file.
    Ignore,
    /// Default priority level assigned by the engine.
    #[default]
    Normal,
    /// Highest available priority.
    High,
}

impl FilePriority {
    #[must_use]
    /// Numeric level expected by libtorrent-style engines.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ignore => 0,
            Self::Normal => 4,
            Self::High => 7,
        }
    }

    #[must_use]
    /// Whether the engine will skip the file entirely.
    pub const fn is_ignored(self) -> bool {
        matches!(self, Self::Ignore)
    }
}

/// Piece-level priority pushed to the engine by the buffer window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PiecePriority {
    /// Piece lies outside the playable region.
    Ignore,
    /// Piece is wanted but not urgent.
    Normal,
    /// Piece is within the look-ahead and must be fetched first.
    Top,
}

impl PiecePriority {
    #[must_use]
    /// Numeric level expected by libtorrent-style engines.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ignore => 0,
            Self::Normal => 4,
            Self::Top => 7,
        }
    }
}

/// Priority assigned to a single piece.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PieceAssignment {
    /// Zero-based piece index.
    pub index: u32,
    /// Priority requested for the piece.
    pub priority: PiecePriority,
}

/// Individual file exposed by a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentFile {
    /// Index of the file within the transfer metainfo.
    pub index: u32,
    /// Relative path of the file within the transfer payload.
    pub path: String,
    /// Byte offset of the file within the concatenated payload.
    pub offset_bytes: u64,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
    /// Current priority level.
    pub priority: FilePriority,
}

/// Piece geometry known once metadata has been resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// Display name advertised by the metainfo.
    pub name: String,
    /// Nominal piece length in bytes (the final piece may be shorter).
    pub piece_length: u64,
    /// Number of pieces in the transfer.
    pub piece_count: u32,
}

/// Encoded metainfo used to start the data transfer after metadata resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentMetainfo {
    /// Bencoded metainfo payload.
    pub bytes: Vec<u8>,
}

impl TorrentMetainfo {
    #[must_use]
    /// Wrap a raw bencoded payload.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

/// Engine-reported lifecycle state of a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Verifying existing data on disk.
    CheckingFiles,
    /// Resolving metadata from the swarm.
    FetchingMetadata,
    /// Downloading payload pieces.
    Downloading,
    /// Selected payload is complete.
    Finished,
    /// Complete and uploading to peers.
    Seeding,
    /// Halted by the caller or engine.
    Paused,
    /// Engine reported a failure.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
}

/// Aggregated progress metrics for a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Total bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes wanted for completion.
    pub bytes_total: u64,
}

impl TransferProgress {
    #[must_use]
    /// Calculate the completion percentage (0-100).
    pub fn percent_complete(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (to_f64(self.bytes_downloaded) / to_f64(self.bytes_total)) * 100.0
        }
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "u64 to f64 conversion is required for user-facing percentage reporting"
    )]
    {
        value as f64
    }
}

/// Lightweight transfer statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TransferRates {
    /// Current download rate in bytes per second.
    pub download_bps: u64,
    /// Current upload rate in bytes per second.
    pub upload_bps: u64,
}

/// Engine-native status of a transfer handle at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferStatus {
    /// Identifier of the transfer handle.
    pub id: Uuid,
    /// Display name, once metadata is known.
    pub name: Option<String>,
    /// Current lifecycle state.
    pub state: TransferState,
    /// Byte progress of the selected payload.
    pub progress: TransferProgress,
    /// Current transfer rates.
    pub rates: TransferRates,
    /// Connected peers.
    pub peers: u32,
    /// Connected peers that hold the full payload.
    pub seeds: u32,
}

/// Session-wide statistics reported by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Nodes currently known to the DHT routing table.
    pub dht_nodes: u32,
}

/// Startup parameters handed to the engine when the session starts.
///
/// Unknown keys are preserved in `extra` and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineParams {
    /// Optional listen port override.
    pub listen_port: Option<u16>,
    /// Whether the DHT is enabled for peer discovery.
    pub enable_dht: bool,
    /// Extra `host:port` nodes used to bootstrap the DHT.
    pub dht_bootstrap_nodes: Vec<String>,
    /// Optional global download cap in bytes per second.
    pub download_rate_limit: Option<u64>,
    /// Optional global upload cap in bytes per second.
    pub upload_rate_limit: Option<u64>,
    /// Optional global peer connection cap.
    pub connections_limit: Option<u32>,
    /// Suppress identifying information in peer and tracker traffic.
    pub anonymous_mode: bool,
    /// Engine-specific settings forwarded verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            listen_port: None,
            enable_dht: true,
            dht_bootstrap_nodes: Vec::new(),
            download_rate_limit: None,
            upload_rate_limit: None,
            connections_limit: None,
            anonymous_mode: false,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priorities_map_to_native_levels() {
        assert_eq!(FilePriority::Ignore.as_u8(), 0);
        assert_eq!(FilePriority::Normal.as_u8(), 4);
        assert_eq!(FilePriority::High.as_u8(), 7);
        assert_eq!(PiecePriority::Ignore.as_u8(), 0);
        assert_eq!(PiecePriority::Normal.as_u8(), 4);
        assert_eq!(PiecePriority::Top.as_u8(), 7);
        assert!(FilePriority::Ignore.is_ignored());
        assert!(!FilePriority::default().is_ignored());
    }

    #[test]
    fn progress_percent_handles_zero_total() {
        let zero = TransferProgress::default();
        assert!(zero.percent_complete().abs() < f64::EPSILON);

        let half = TransferProgress {
            bytes_downloaded: 5,
            bytes_total: 10,
        };
        assert!((half.percent_complete() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn engine_params_preserve_unknown_keys() -> anyhow::Result<()> {
        let params: EngineParams = serde_json::from_value(json!({
            "listen_port": 6881,
            "peer_fingerprint": "-RL0100-",
        }))?;

        assert_eq!(params.listen_port, Some(6881));
        assert!(params.enable_dht, "dht defaults to enabled");
        assert_eq!(params.extra.get("peer_fingerprint"), Some(&json!("-RL0100-")));

        let round = serde_json::to_value(&params)?;
        assert_eq!(round["peer_fingerprint"], json!("-RL0100-"));
        Ok(())
    }
}
