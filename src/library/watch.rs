//! Keeps the store in sync with the file system while the library is open.
//!
//! [`LibraryWatcher`] owns a [`FileWatcher`] and a consumer running on the
//! blocking pool. The consumer turns each [`WatchEvent`] into an indexer
//! call. Dropping the watcher stops both.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tokio::runtime::Handle;

use super::index::{IndexOutcome, Indexer};
use crate::error::Result;
use crate::scanner::{FileWatcher, WatchError, WatchEvent, collect_audio_files};

/// How often the consumer checks whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct LibraryWatcher {
    watcher: FileWatcher,
    stop: Arc<AtomicBool>,
}

impl LibraryWatcher {
    /// Start watching `roots` recursively.
    ///
    /// A root that can't be watched is logged and skipped; if none of a
    /// non-empty `roots` can be watched this fails. Must be called from
    /// within a tokio runtime.
    pub fn start(indexer: Indexer, roots: &[PathBuf]) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| WatchError::Init(e.to_string()))?;
        let (mut watcher, rx) = FileWatcher::new()?;

        for root in roots {
            if let Err(e) = watcher.watch(root) {
                tracing::warn!(target: "library::watch", root = %root.display(), error = %e, "Cannot watch folder");
            }
        }

        if !roots.is_empty() && watcher.watched().is_empty() {
            return Err(WatchError::Watch("no library folder could be watched".to_string()).into());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let runtime = handle.clone();
        handle.spawn_blocking(move || consume(runtime, indexer, rx, stop_flag));

        tracing::info!(target: "library::watch", roots = watcher.watched().len(), "Library watcher started");

        Ok(Self { watcher, stop })
    }

    /// Roots that are actually being watched.
    pub fn roots(&self) -> &[PathBuf] {
        self.watcher.watched()
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        tracing::info!(target: "library::watch", "Library watcher stopped");
    }
}

fn consume(runtime: Handle, indexer: Indexer, rx: Receiver<WatchEvent>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                if let Err(e) = runtime.block_on(apply_event(&indexer, event)) {
                    tracing::warn!(target: "library::watch", error = %e, "Failed to apply change");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Apply one file system change to the store.
pub async fn apply_event(indexer: &Indexer, event: WatchEvent) -> Result<()> {
    match event {
        WatchEvent::Created(path) | WatchEvent::Modified(path) => {
            let outcome = indexer.index_path(&path).await?;
            if outcome != IndexOutcome::Skipped {
                tracing::info!(target: "library::watch", path = %path.display(), ?outcome, "Indexed change");
            }
        }
        WatchEvent::DirCreated(dir) => {
            let files = collect_audio_files(std::slice::from_ref(&dir));
            tracing::info!(target: "library::watch", dir = %dir.display(), files = files.len(), "Directory appeared");
            for file in files {
                if let Err(e) = indexer.index_path(&file).await {
                    tracing::warn!(target: "library::watch", path = %file.display(), error = %e, "Skipping file");
                }
            }
        }
        WatchEvent::Removed(path) => {
            if indexer.remove_path(&path).await? {
                tracing::info!(target: "library::watch", path = %path.display(), "Track removed");
            }
        }
        WatchEvent::DirRemoved(dir) => {
            let removed = indexer.remove_dir(&dir).await?;
            if removed > 0 {
                tracing::info!(target: "library::watch", dir = %dir.display(), removed, "Directory removed");
            }
        }
        WatchEvent::Error(message) => {
            tracing::warn!(target: "library::watch", error = %message, "Watcher reported an error");
        }
    }
    Ok(())
}
