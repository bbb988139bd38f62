//! Sample transfers, descriptors, and logging setup for tests.

use reel_core::{FilePriority, TorrentFile, TorrentMetadata, TorrentMetainfo};
use reel_telemetry::{LogFormat, LoggingConfig};

/// Percent-encoded magnet descriptor, as a caller would pass it in.
pub const MAGNET_URI: &str = "magnet%3A%3Fxt%3Durn%3Abtih%3A0123456789abcdef0123456789abcdef01234567%26dn%3Dsample";
/// [`MAGNET_URI`] after percent-decoding.
pub const MAGNET_URI_DECODED: &str =
    "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=sample";

/// Piece length of the sample transfer.
pub const SAMPLE_PIECE_LENGTH: u64 = 64 * 1024;
/// Piece count of the sample transfer.
pub const SAMPLE_PIECE_COUNT: u32 = 68;
/// Index of the largest file in [`sample_files`].
pub const SAMPLE_LARGEST_FILE: u32 = 1;
/// First piece of the largest sample file.
pub const SAMPLE_WINDOW_FIRST: u32 = 3;
/// Last piece of the largest sample file.
pub const SAMPLE_WINDOW_LAST: u32 = 67;

/// Three files laid out back to back: a small readme, a movie, and subtitles.
///
/// With [`SAMPLE_PIECE_LENGTH`] pieces the movie spans
/// [`SAMPLE_WINDOW_FIRST`]..=[`SAMPLE_WINDOW_LAST`].
#[must_use]
pub fn sample_files() -> Vec<TorrentFile> {
    let sizes = [
        ("sample/readme.txt", 200_000),
        ("sample/movie.mkv", 64 * SAMPLE_PIECE_LENGTH),
        ("sample/movie.srt", 50_000),
    ];
    let mut offset = 0;
    sizes
        .iter()
        .zip(0..)
        .map(|(&(path, size_bytes), index)| {
            let file = TorrentFile {
                index,
                path: path.to_string(),
                offset_bytes: offset,
                size_bytes,
                priority: FilePriority::Normal,
            };
            offset += size_bytes;
            file
        })
        .collect()
}

/// Piece geometry matching [`sample_files`].
#[must_use]
pub fn sample_metadata() -> TorrentMetadata {
    TorrentMetadata {
        name: "sample".into(),
        piece_length: SAMPLE_PIECE_LENGTH,
        piece_count: SAMPLE_PIECE_COUNT,
    }
}

/// Opaque metainfo bytes for the sample transfer.
#[must_use]
pub fn sample_metainfo() -> TorrentMetainfo {
    TorrentMetainfo::new(b"d4:infod4:name6:sampleee".to_vec())
}

/// Install a pretty subscriber for test output; repeated calls are ignored.
pub fn init_test_logging() {
    let config = LoggingConfig {
        level: "debug".into(),
        format: LogFormat::Pretty,
        build_sha: "test".into(),
    };
    let _ = reel_telemetry::init_logging(&config);
}
