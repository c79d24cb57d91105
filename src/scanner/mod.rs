//! Filesystem side of the index: collecting audio files, fingerprinting
//! them and watching library roots for changes.

pub mod fingerprint;
mod watcher;

pub use fingerprint::{FileFingerprint, fingerprint};
pub use watcher::{FileWatcher, WatchError, WatchEvent};

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions the indexer picks up (compared case-insensitively).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "wav", "aac", "opus"];

/// Check if a path has a supported audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Recursively collects audio files under every root.
///
/// Traversal is iterative (walkdir keeps its own directory stack), so deep
/// libraries cannot overflow the call stack. A directory that cannot be read
/// is logged and its subtree skipped; the rest of the walk continues.
pub fn collect_audio_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        let before = files.len();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    tracing::warn!(target: "scanner", path = %path, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && is_audio_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        tracing::debug!(
            target: "scanner",
            root = %root.display(),
            count = files.len() - before,
            "Collected audio files"
        );
    }

    files
}
