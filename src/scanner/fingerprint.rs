//! Cheap change detection for audio files.
//!
//! A fingerprint is the SHA-1 of `path:size:mtime_ms`. File content is never
//! read, so a move produces a new fingerprint and an edit that keeps both
//! size and mtime goes unnoticed.

use sha1::{Digest, Sha1};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Stat data and the resulting fingerprint for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: i64,
    /// Lowercase hex SHA-1 (40 characters)
    pub hash: String,
}

/// Stat a file and compute its fingerprint.
///
/// # Errors
///
/// Returns an IO error if the file cannot be stat'ed (e.g. it vanished
/// between collection and indexing).
pub fn fingerprint(path: &Path) -> std::io::Result<FileFingerprint> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let mtime_ms = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(FileFingerprint {
        size,
        mtime_ms,
        hash: compute_hash(path, size, mtime_ms),
    })
}

/// Hash of the `(path, size, mtime)` triple.
pub fn compute_hash(path: &Path, size: u64, mtime_ms: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{}:{}:{}", path.display(), size, mtime_ms).as_bytes());
    format!("{:x}", hasher.finalize())
}
