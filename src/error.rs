//! Application-wide error types.
//!
//! Library modules return [`Error`] via the [`Result`] alias, while the
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! Most failures in the indexer are per-unit: a bad file, an unreadable
//! directory or a failed merge group is logged and skipped by the caller.
//! These types exist so the caller can tell the units apart.
//!
//! # Example
//!
//! ```ignore
//! use music_index::error::{Error, Result};
//!
//! async fn index(pool: &SqlitePool, path: &Path) -> Result<()> {
//!     let fp = fingerprint(path)?;              // IO errors auto-convert
//!     db::get_track_by_path(pool, &p).await?;   // Database errors auto-convert
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use crate::scanner::WatchError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Metadata reading error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to I/O results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::metadata("/music/a.flac", "bad header").context("while indexing");
        let msg = err.to_string();
        assert!(msg.contains("while indexing"));
        assert!(msg.contains("/music/a.flac"));
        assert!(msg.contains("bad header"));
    }

    #[test]
    fn test_metadata_error() {
        let err = Error::metadata("/music/song.mp3", "unsupported format");
        let msg = err.to_string();
        assert!(msg.contains("song.mp3"));
        assert!(msg.contains("unsupported format"));
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.with_context("reading /music").unwrap_err();
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.to_string().contains("reading /music"));
    }

    #[test]
    fn test_watch_error_converts() {
        let err: Error = WatchError::Watch("gone".to_string()).into();
        assert!(err.to_string().contains("gone"));
    }
}
