//! Cover art lookup for indexed tracks.
//!
//! Covers come from the picture embedded in the audio file and are cached on
//! disk under the track's fingerprint, so a file is parsed for its cover at
//! most once while the cache holds it. A changed file gets a new fingerprint
//! and therefore a fresh cache entry.
//!
//! Missing art is not an error: every failure along the way yields `None`.

mod cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::SqlitePool;

pub use cache::DiskCache;

use crate::db;
use crate::metadata::{MetadataExtractor, extract_blocking};

/// Default cache location under the user cache directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("music-index")
        .join("covers")
}

/// Resolves cover art for tracks, backed by a [`DiskCache`].
#[derive(Clone)]
pub struct CoverCache {
    cache: DiskCache,
    pool: SqlitePool,
    extractor: Arc<dyn MetadataExtractor>,
}

impl CoverCache {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        pool: SqlitePool,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            cache: DiskCache::new(cache_dir),
            pool,
            extractor,
        }
    }

    /// Cover bytes for a track, or `None` if the track is unknown, the file
    /// can't be parsed or it has no embedded picture.
    ///
    /// A failed cache write still returns the extracted bytes.
    pub async fn cover_for_track(&self, track_id: i64) -> Option<Vec<u8>> {
        let track = match db::get_track_by_id(&self.pool, track_id).await {
            Ok(Some(track)) => track,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(target: "cover", track_id, error = %e, "Track lookup failed");
                return None;
            }
        };

        if let Some(bytes) = self.cache.get(&track.hash) {
            tracing::trace!(target: "cover", track_id, "Cache hit");
            return Some(bytes);
        }

        let meta = match extract_blocking(&self.extractor, Path::new(&track.path)).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(target: "cover", track_id, error = %e, "Cover extraction failed");
                return None;
            }
        };

        let picture = meta.picture?;

        if let Err(e) = self.cache.put(&track.hash, &picture.data) {
            tracing::warn!(
                target: "cover",
                track_id,
                dir = %self.cache.dir().display(),
                error = %e,
                "Failed to cache cover"
            );
        }

        Some(picture.data)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.cache.contains(hash)
    }

    pub fn clear(&self) -> Result<(), std::io::Error> {
        self.cache.clear()
    }

    pub fn size_bytes(&self) -> u64 {
        self.cache.size_bytes()
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }
}
