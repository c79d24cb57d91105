//! File system watcher for detecting library changes.
//!
//! Uses the `notify` crate to watch directories for changes and emit events
//! when audio files are added, modified, or removed.
//!
//! # Design
//!
//! - **Debounced events**: Multiple rapid changes coalesce into single events
//! - **Audio files only**: Filters for supported extensions (mp3, flac, etc.)
//! - **Non-blocking**: Runs on notify's thread, sends events via channel
//! - **Graceful shutdown**: Stop watching by dropping the handle
//!
//! # Usage
//!
//! ```rust,ignore
//! let (mut watcher, rx) = FileWatcher::new()?;
//! watcher.watch(Path::new("/music"))?;
//!
//! while let Ok(event) = rx.recv() {
//!     match event {
//!         WatchEvent::Created(path) => println!("New file: {:?}", path),
//!         WatchEvent::Removed(path) => println!("Deleted: {:?}", path),
//!         _ => {}
//!     }
//! }
//! ```

use crossbeam_channel::{Receiver, Sender, bounded};
use notify::{
    EventKind, RecommendedWatcher, RecursiveMode,
    event::{ModifyKind, RemoveKind, RenameMode},
};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::is_audio_file;

/// Debounce window for coalescing bursts of events on the same path.
const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(500);

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A new audio file was created (or renamed into place)
    Created(PathBuf),
    /// An existing audio file was modified
    Modified(PathBuf),
    /// An audio file was removed (or renamed away)
    Removed(PathBuf),
    /// A directory was created (may contain audio files)
    DirCreated(PathBuf),
    /// A directory was removed
    DirRemoved(PathBuf),
    /// An error occurred while watching
    Error(String),
}

/// Handle to a running file watcher.
///
/// Dropping this handle will stop the watcher.
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    running: Arc<AtomicBool>,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Create a watcher with no directories yet.
    ///
    /// Returns the watcher handle and a receiver for watch events.
    pub fn new() -> Result<(Self, Receiver<WatchEvent>), WatchError> {
        let (tx, rx) = bounded(1024);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let debouncer = new_debouncer(
            DEBOUNCE_TIMEOUT,
            None, // No tick rate limit
            move |result: DebounceEventResult| {
                if !running_clone.load(Ordering::Relaxed) {
                    return;
                }
                handle_debounced_events(result, &tx);
            },
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        Ok((
            Self {
                debouncer,
                running,
                watched: Vec::new(),
            },
            rx,
        ))
    }

    /// Add a directory to watch recursively.
    pub fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        tracing::info!(target: "scanner::watcher", path = %path.display(), "Watching directory");
        self.debouncer
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(format!("{}: {}", path.display(), e)))?;
        self.watched.push(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a directory.
    pub fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
        tracing::info!(target: "scanner::watcher", path = %path.display(), "Unwatching directory");
        self.debouncer
            .unwatch(path)
            .map_err(|e| WatchError::Watch(format!("{}: {}", path.display(), e)))?;
        self.watched.retain(|p| p != path);
        Ok(())
    }

    /// Directories currently being watched.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::debug!(target: "scanner::watcher", "File watcher stopped");
    }
}

/// Handle debounced events from notify.
fn handle_debounced_events(result: DebounceEventResult, tx: &Sender<WatchEvent>) {
    match result {
        Ok(events) => {
            for event in events {
                for watch_event in classify(&event.kind, &event.paths) {
                    if tx.try_send(watch_event).is_err() {
                        tracing::warn!(target: "scanner::watcher", "Event channel full, dropping event");
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                tracing::warn!(target: "scanner::watcher", error = %error, "Watch error");
                let _ = tx.try_send(WatchEvent::Error(error.to_string()));
            }
        }
    }
}

/// Map a notify event onto zero or more library events.
fn classify(kind: &EventKind, paths: &[PathBuf]) -> Vec<WatchEvent> {
    let mut out = Vec::new();

    match kind {
        EventKind::Create(_) => {
            for path in paths {
                if path.is_dir() {
                    tracing::debug!(target: "scanner::watcher", path = %path.display(), "Directory created");
                    out.push(WatchEvent::DirCreated(path.clone()));
                } else if is_audio_file(path) {
                    tracing::debug!(target: "scanner::watcher", path = %path.display(), "File created");
                    out.push(WatchEvent::Created(path.clone()));
                }
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            if let [from, to] = paths {
                out.extend(removed(from, None));
                out.extend(arrived(to));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in paths {
                out.extend(removed(path, None));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in paths {
                out.extend(arrived(path));
            }
        }
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Modify(ModifyKind::Any) => {
            for path in paths {
                if path.is_file() && is_audio_file(path) {
                    tracing::debug!(target: "scanner::watcher", path = %path.display(), "File modified");
                    out.push(WatchEvent::Modified(path.clone()));
                }
            }
        }
        EventKind::Remove(remove_kind) => {
            for path in paths {
                out.extend(removed(path, Some(remove_kind)));
            }
        }
        _ => {}
    }

    out
}

/// A path appeared (created or renamed into place).
fn arrived(path: &Path) -> Option<WatchEvent> {
    if path.is_dir() {
        Some(WatchEvent::DirCreated(path.to_path_buf()))
    } else if is_audio_file(path) {
        Some(WatchEvent::Created(path.to_path_buf()))
    } else {
        None
    }
}

/// A path went away. The file is gone, so only the extension and the
/// reported kind are left to go on.
fn removed(path: &Path, kind: Option<&RemoveKind>) -> Option<WatchEvent> {
    match kind {
        Some(RemoveKind::Folder) => {
            tracing::debug!(target: "scanner::watcher", path = %path.display(), "Directory removed");
            Some(WatchEvent::DirRemoved(path.to_path_buf()))
        }
        _ if is_audio_file(path) => {
            tracing::debug!(target: "scanner::watcher", path = %path.display(), "File removed");
            Some(WatchEvent::Removed(path.to_path_buf()))
        }
        // Unknown kind without an audio extension: most likely a directory
        Some(RemoveKind::Any) | None => Some(WatchEvent::DirRemoved(path.to_path_buf())),
        _ => None,
    }
}

/// Errors that can occur during file watching.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    Init(String),
    #[error("Failed to watch path: {0}")]
    Watch(String),
}
