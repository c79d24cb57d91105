//! Test utilities and fixtures for music-index tests.
//!
//! This module provides common test helpers, fakes, and database utilities
//! to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use music_index::test_utils::{temp_db, FakeExtractor};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let extractor = FakeExtractor::new();
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;
use tokio::sync::oneshot;

use crate::db::TrackRecord;
use crate::error::{Error, Result};
use crate::metadata::{AudioMetadata, EmbeddedPicture, MetadataExtractor};
use crate::scanner::fingerprint::compute_hash;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_url = crate::db::db_url(Some(&dir.path().join("test.db")));

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Creates a TrackRecord for `path` with sensible defaults.
///
/// The hash is derived from the path so records for different paths never
/// collide on the unique index.
pub fn mock_track_record(path: &str) -> TrackRecord {
    TrackRecord {
        path: path.to_string(),
        folder_id: None,
        title: "Test Track".to_string(),
        artist_id: None,
        album_id: None,
        track_no: Some(1),
        disc_no: 1,
        duration_ms: Some(180_000),
        bitrate: Some(320),
        sample_rate: Some(44_100),
        year: Some(2023),
        genre: None,
        hash: compute_hash(Path::new(path), 0, 0),
    }
}

/// Metadata a tagged test file would carry.
pub fn mock_metadata(artist: &str, album: &str, title: &str) -> AudioMetadata {
    AudioMetadata {
        title: Some(title.to_string()),
        artist: Some(artist.to_string()),
        album: Some(album.to_string()),
        track_no: Some(1),
        duration_ms: 180_000,
        bitrate: Some(320),
        sample_rate: Some(44_100),
        year: Some(2023),
        ..AudioMetadata::default()
    }
}

/// In-memory [`MetadataExtractor`] that counts calls.
///
/// Files are matched by file name. Unknown files yield empty metadata, and
/// names registered with [`FakeExtractor::fail`] yield a metadata error.
#[derive(Default)]
pub struct FakeExtractor {
    by_name: Mutex<HashMap<String, AudioMetadata>>,
    failing: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `meta` for every file called `file_name`.
    pub fn with(self, file_name: &str, meta: AudioMetadata) -> Self {
        self.by_name.lock().insert(file_name.to_string(), meta);
        self
    }

    /// Fail extraction for every file called `file_name`.
    pub fn fail(self, file_name: &str) -> Self {
        self.failing.lock().push(file_name.to_string());
        self
    }

    /// Number of extract calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataExtractor for FakeExtractor {
    fn extract(&self, path: &Path) -> Result<AudioMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.failing.lock().contains(&name) {
            return Err(Error::metadata(path, "corrupt test file"));
        }

        Ok(self.by_name.lock().get(&name).cloned().unwrap_or_default())
    }
}

/// Extractor that blocks until an async task lets it through.
///
/// On entry it signals its [`ExtractorGate`], then waits for the gate to
/// open. The gate is opened from a task, so on a current-thread runtime the
/// wait only ends if extraction runs off the runtime thread. Gives up after
/// five seconds with a metadata error.
pub struct GatedExtractor {
    inner: FakeExtractor,
    started: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
    released: AtomicBool,
}

/// Async side of a [`GatedExtractor`].
pub struct ExtractorGate {
    started: oneshot::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl ExtractorGate {
    /// Wait until extraction has begun, then let it finish.
    pub async fn open_when_started(self) {
        let _ = self.started.await;
        let _ = self.release.send(());
    }
}

impl GatedExtractor {
    pub fn new(inner: FakeExtractor) -> (Self, ExtractorGate) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated = Self {
            inner,
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(release_rx),
            released: AtomicBool::new(false),
        };
        let gate = ExtractorGate {
            started: started_rx,
            release: release_tx,
        };
        (gated, gate)
    }
}

impl MetadataExtractor for GatedExtractor {
    fn extract(&self, path: &Path) -> Result<AudioMetadata> {
        if !self.released.load(Ordering::SeqCst) {
            if let Some(started) = self.started.lock().take() {
                let _ = started.send(());
            }
            self.release
                .lock()
                .recv_timeout(Duration::from_secs(5))
                .map_err(|_| Error::metadata(path, "extractor was never released"))?;
            self.released.store(true, Ordering::SeqCst);
        }
        self.inner.extract(path)
    }
}

/// Metadata with an embedded JPEG-ish picture.
pub fn metadata_with_picture(bytes: &[u8]) -> AudioMetadata {
    AudioMetadata {
        picture: Some(EmbeddedPicture {
            data: bytes.to_vec(),
        }),
        ..AudioMetadata::default()
    }
}

/// Create a file with fixed contents and return its path.
pub fn write_file(dir: &Path, relative: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Move a file's modification time forward without touching its contents.
pub fn bump_mtime(path: &Path, by: Duration) {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("Failed to open test file");
    file.set_modified(modified + by)
        .expect("Failed to set modification time");
}

/// Write a minimal mono 16-bit PCM WAV file (one second of silence).
pub fn write_wav(path: &Path, sample_rate: u32) {
    let data_len = sample_rate * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);

    std::fs::write(path, bytes).expect("Failed to write wav");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let tracks = crate::db::get_all_tracks(&pool).await.unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_mock_track_records_have_distinct_hashes() {
        let a = mock_track_record("/music/a.mp3");
        let b = mock_track_record("/music/b.mp3");
        assert_ne!(a.hash, b.hash);
        assert_eq!(a.disc_no, 1);
    }

    #[test]
    fn test_fake_extractor_counts_and_fails() {
        let fake = FakeExtractor::new()
            .with("a.mp3", mock_metadata("Artist", "Album", "Song"))
            .fail("bad.mp3");

        let meta = fake.extract(Path::new("/x/a.mp3")).unwrap();
        assert_eq!(meta.artist.as_deref(), Some("Artist"));
        assert!(fake.extract(Path::new("/x/bad.mp3")).is_err());
        assert_eq!(fake.extract(Path::new("/x/other.mp3")).unwrap(), AudioMetadata::default());
        assert_eq!(fake.calls(), 3);
    }
}
