//! Change detection and upsert pipeline.
//!
//! [`Indexer`] turns a file path into a track row: fingerprint the file,
//! skip it if the stored fingerprint matches, otherwise extract metadata,
//! resolve artist and album, and insert or update the track.
//!
//! Every store mutation holds a shared write gate, so a full scan and
//! watcher events touching the same path apply one after the other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::{self, TrackRecord, UNKNOWN_ALBUM, UNKNOWN_ARTIST};
use crate::error::{Result, ResultExt};
use crate::metadata::{AudioMetadata, MetadataExtractor, extract_blocking};
use crate::scanner::{collect_audio_files, fingerprint};

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// New track row with this ID
    Added(i64),
    /// Existing track row re-read from disk
    Updated(i64),
    /// Fingerprint unchanged, nothing to do
    Skipped,
}

/// Aggregate counts for a scan. Skipped and failed files count as scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub added: usize,
    pub updated: usize,
}

/// Upsert engine shared by the scanner and the watcher.
#[derive(Clone)]
pub struct Indexer {
    pool: SqlitePool,
    extractor: Arc<dyn MetadataExtractor>,
    write_gate: Arc<Mutex<()>>,
}

impl Indexer {
    pub fn new(pool: SqlitePool, extractor: Arc<dyn MetadataExtractor>) -> Self {
        Self {
            pool,
            extractor,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Index one file that belongs to the folder `folder_id`.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be stat'ed, its metadata can't be parsed, or
    /// a store write fails. Callers treat any error as "skip this file".
    pub async fn index_file(&self, path: &Path, folder_id: Option<i64>) -> Result<IndexOutcome> {
        let fp = fingerprint(path).with_context(format!("stat {}", path.display()))?;
        let path_str = path.to_string_lossy().into_owned();

        let _guard = self.write_gate.lock().await;

        let existing = db::get_track_by_path(&self.pool, &path_str).await?;
        if let Some(track) = &existing
            && track.hash == fp.hash
        {
            return Ok(IndexOutcome::Skipped);
        }

        let meta = extract_blocking(&self.extractor, path).await?;

        let artist_name = meta
            .artist
            .as_deref()
            .or(meta.album_artist.as_deref())
            .unwrap_or(UNKNOWN_ARTIST);
        let artist_id = db::get_or_create_artist(&self.pool, artist_name).await?;

        let year = meta.year.map(i64::from);
        let album_name = meta.album.as_deref().unwrap_or(UNKNOWN_ALBUM);
        let album_id = db::get_or_create_album(&self.pool, album_name, Some(artist_id), year).await?;

        let record = track_record(path, path_str, folder_id, &meta, artist_id, album_id, fp.hash);

        match existing {
            Some(track) => {
                db::update_track(&self.pool, track.id, &record).await?;
                tracing::debug!(target: "library::index", path = %path.display(), id = track.id, "Track updated");
                Ok(IndexOutcome::Updated(track.id))
            }
            None => {
                let id = db::insert_track(&self.pool, &record).await?;
                tracing::debug!(target: "library::index", path = %path.display(), id, "Track added");
                Ok(IndexOutcome::Added(id))
            }
        }
    }

    /// Index one file, looking up which registered folder owns it.
    pub async fn index_path(&self, path: &Path) -> Result<IndexOutcome> {
        let folder_id = db::folder_id_for_path(&self.pool, path).await?;
        self.index_file(path, folder_id).await
    }

    /// Remove the track stored for `path`, if any.
    pub async fn remove_path(&self, path: &Path) -> Result<bool> {
        let _guard = self.write_gate.lock().await;
        Ok(db::delete_track_by_path(&self.pool, &path.to_string_lossy()).await?)
    }

    /// Remove every track stored under the directory `dir`.
    pub async fn remove_dir(&self, dir: &Path) -> Result<u64> {
        let _guard = self.write_gate.lock().await;
        Ok(db::delete_tracks_under(&self.pool, dir).await?)
    }

    /// Register `roots`, then index every audio file beneath them.
    ///
    /// Files are processed one at a time. `on_progress` is called after
    /// every file with the completed fraction and the file's path, whatever
    /// the outcome. A file that fails is logged and counted as scanned.
    pub async fn scan_folders<F>(&self, roots: &[PathBuf], mut on_progress: F) -> Result<ScanSummary>
    where
        F: FnMut(f64, &Path),
    {
        let mut candidates: Vec<(PathBuf, Option<i64>)> = Vec::new();

        for root in roots {
            let folder_id = match db::register_folder(&self.pool, root).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(target: "library::index", root = %root.display(), error = %e, "Failed to register folder");
                    None
                }
            };

            let walk_root = root.clone();
            let files = match tokio::task::spawn_blocking(move || {
                collect_audio_files(std::slice::from_ref(&walk_root))
            })
            .await
            {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(target: "library::index", root = %root.display(), error = %e, "File collection aborted");
                    Vec::new()
                }
            };

            candidates.extend(files.into_iter().map(|f| (f, folder_id)));
        }

        let total = candidates.len();
        tracing::info!(target: "library::index", roots = roots.len(), files = total, "Starting scan");

        let mut summary = ScanSummary::default();
        let mut failed = 0;

        for (i, (path, folder_id)) in candidates.iter().enumerate() {
            match self.index_file(path, *folder_id).await {
                Ok(IndexOutcome::Added(_)) => summary.added += 1,
                Ok(IndexOutcome::Updated(_)) => summary.updated += 1,
                Ok(IndexOutcome::Skipped) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!(target: "library::index", path = %path.display(), error = %e, "Skipping file");
                }
            }
            summary.scanned += 1;
            on_progress((i + 1) as f64 / total as f64, path.as_path());
        }

        tracing::info!(
            target: "library::index",
            scanned = summary.scanned,
            added = summary.added,
            updated = summary.updated,
            failed,
            "Scan complete"
        );

        Ok(summary)
    }
}

fn track_record(
    path: &Path,
    path_str: String,
    folder_id: Option<i64>,
    meta: &AudioMetadata,
    artist_id: i64,
    album_id: i64,
    hash: String,
) -> TrackRecord {
    let title = meta.title.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.clone())
    });

    TrackRecord {
        path: path_str,
        folder_id,
        title,
        artist_id: Some(artist_id),
        album_id: Some(album_id),
        track_no: meta.track_no.map(i64::from),
        disc_no: meta.disc_no.map(i64::from).unwrap_or(1),
        duration_ms: (meta.duration_ms > 0).then_some(meta.duration_ms as i64),
        bitrate: meta.bitrate.map(i64::from),
        sample_rate: meta.sample_rate.map(i64::from),
        year: meta.year.map(i64::from),
        genre: meta.genre.clone(),
        hash,
    }
}
