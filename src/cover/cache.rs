//! Cover art disk cache.
//!
//! One file per track fingerprint: `<hash>.jpg`. The extension is fixed
//! whatever the embedded image format is.
//!
//! Writes go to a uniquely named `.tmp` sibling and are renamed into place,
//! so a reader only ever sees a missing file or a complete one.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

const COVER_EXT: &str = "jpg";

/// Distinguishes temp files of concurrent writers within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory of cached cover images keyed by track hash.
#[derive(Debug, Clone)]
pub struct DiskCache {
    cache_dir: PathBuf,
}

impl DiskCache {
    /// The directory is created lazily on the first write.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Get cached bytes for a track hash.
    pub fn get(&self, hash: &str) -> Option<Vec<u8>> {
        fs::read(self.cache_path(hash)).ok()
    }

    /// Store bytes for a track hash, creating the cache directory if needed.
    ///
    /// The final file appears atomically. Concurrent writers for the same
    /// hash each rename a complete file, and the last rename wins.
    pub fn put(&self, hash: &str, data: &[u8]) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_path(hash);
        let tmp = self.cache_dir.join(format!(
            ".{hash}.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(path)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.cache_path(hash).is_file()
    }

    pub fn cache_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{hash}.{COVER_EXT}"))
    }

    /// Clear all cached covers.
    pub fn clear(&self) -> Result<(), std::io::Error> {
        if self.cache_dir.exists() {
            for entry in fs::read_dir(&self.cache_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }

    /// Get the total size of cached covers in bytes.
    ///
    /// Leftover temp files from an interrupted write are not counted.
    pub fn size_bytes(&self) -> u64 {
        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == COVER_EXT))
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_creates_directory_and_get_reads_back() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path().join("nested").join("covers"));

        assert!(cache.get("abc").is_none());
        let path = cache.put("abc", b"fake jpeg data").unwrap();

        assert_eq!(path.file_name().unwrap(), "abc.jpg");
        assert_eq!(cache.get("abc").unwrap(), b"fake jpeg data");
        assert!(cache.contains("abc"));
    }

    #[test]
    fn test_clear_and_size() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path());

        assert_eq!(cache.size_bytes(), 0);
        cache.put("r1", &[0; 1000]).unwrap();
        cache.put("r2", &[0; 24]).unwrap();
        assert_eq!(cache.size_bytes(), 1024);

        cache.clear().unwrap();
        assert!(!cache.contains("r1"));
        assert!(!cache.contains("r2"));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path());

        cache.put("abc", b"first").unwrap();
        cache.put("abc", b"second, longer").unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["abc.jpg".to_string()]);
        assert_eq!(cache.get("abc").unwrap(), b"second, longer");
    }

    #[test]
    fn test_interrupted_write_is_not_a_hit() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path());

        // What a crash between write and rename leaves behind
        fs::write(temp.path().join(".abc.1.0.tmp"), b"trunc").unwrap();

        assert!(cache.get("abc").is_none());
        assert!(!cache.contains("abc"));
        assert_eq!(cache.size_bytes(), 0);

        cache.put("abc", b"complete").unwrap();
        assert_eq!(cache.get("abc").unwrap(), b"complete");
        assert_eq!(cache.size_bytes(), 8);

        cache.clear().unwrap();
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_puts_never_expose_partial_files() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path());
        const LEN: usize = 256 * 1024;

        std::thread::scope(|s| {
            for fill in 1..=4u8 {
                let cache = &cache;
                s.spawn(move || {
                    for _ in 0..10 {
                        cache.put("shared", &vec![fill; LEN]).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..200 {
                    if let Some(bytes) = cache.get("shared") {
                        assert_eq!(bytes.len(), LEN);
                        assert!(bytes.iter().all(|b| *b == bytes[0]));
                    }
                }
            });
        });

        let names: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let cache = DiskCache::new(temp.path().join("never-created"));

        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.clear().is_ok());
    }
}
