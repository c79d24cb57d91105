//! The indexed library: store, indexer, watcher and cover cache wired together.
//!
//! [`Library`] is the outward face of the crate. It exposes the two entry
//! points callers need, [`Library::scan_folders`] and
//! [`Library::cover_for_track`], and keeps at most one live
//! [`LibraryWatcher`].

mod index;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::SqlitePool;

pub use index::{IndexOutcome, Indexer, ScanSummary};
pub use watch::{LibraryWatcher, apply_event};

use crate::config::Config;
use crate::cover::CoverCache;
use crate::db::{self, dedup::MigrationReport};
use crate::error::Result;
use crate::metadata::{LoftyExtractor, MetadataExtractor};

pub struct Library {
    indexer: Indexer,
    covers: CoverCache,
    watch_enabled: bool,
    watcher: Mutex<Option<LibraryWatcher>>,
}

impl Library {
    /// Open the store named by `config`, run startup migration and wire up
    /// the lofty-backed extractor.
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = config.database_path();
        let pool = db::open(&db_path).await?;
        tracing::info!(target: "library::index", db = %db_path.display(), "Opened library database");

        let library = Self::new(
            pool,
            Arc::new(LoftyExtractor::new()),
            config.cover_dir(),
            config.library.watch_for_changes,
        );
        library.migrate().await?;
        Ok(library)
    }

    pub fn new(
        pool: SqlitePool,
        extractor: Arc<dyn MetadataExtractor>,
        cover_dir: impl Into<PathBuf>,
        watch_enabled: bool,
    ) -> Self {
        Self {
            covers: CoverCache::new(cover_dir, pool.clone(), Arc::clone(&extractor)),
            indexer: Indexer::new(pool, extractor),
            watch_enabled,
            watcher: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.indexer.pool()
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn covers(&self) -> &CoverCache {
        &self.covers
    }

    /// Normalize names and merge duplicate artists and albums.
    pub async fn migrate(&self) -> Result<MigrationReport> {
        db::dedup::run(self.pool()).await
    }

    /// Register and scan `roots`, then watch them if watching is enabled.
    ///
    /// The scan is committed by the time watching starts, so a watch failure
    /// is logged and the summary still returned.
    pub async fn scan_folders<F>(&self, roots: &[PathBuf], on_progress: F) -> Result<ScanSummary>
    where
        F: FnMut(f64, &Path),
    {
        let summary = self.indexer.scan_folders(roots, on_progress).await?;

        if self.watch_enabled {
            if let Err(e) = self.watch(roots) {
                tracing::warn!(target: "library::watch", error = %e, "Scan finished but folders are not watched");
            }
        }

        Ok(summary)
    }

    /// Replace the current watch set with `roots`.
    pub fn watch(&self, roots: &[PathBuf]) -> Result<()> {
        let mut slot = self.watcher.lock();
        // The old consumer must stop before the new one starts writing
        slot.take();
        *slot = Some(LibraryWatcher::start(self.indexer.clone(), roots)?);
        Ok(())
    }

    pub fn stop_watching(&self) {
        self.watcher.lock().take();
    }

    /// Roots under watch, empty when not watching.
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.watcher
            .lock()
            .as_ref()
            .map(|w| w.roots().to_vec())
            .unwrap_or_default()
    }

    pub async fn cover_for_track(&self, track_id: i64) -> Option<Vec<u8>> {
        self.covers.cover_for_track(track_id).await
    }
}
