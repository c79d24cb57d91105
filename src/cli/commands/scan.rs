//! Library scanning and file watching commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::db;
use crate::library::Library;

/// Register and scan library folders, then watch them until Ctrl+C.
pub fn cmd_scan(rt: &Runtime, mut config: Config, paths: &[PathBuf], no_watch: bool) -> anyhow::Result<()> {
    let roots: Vec<PathBuf> = paths.iter().map(|p| absolute(p)).collect();

    let mut registered = false;
    for root in &roots {
        registered |= config.add_library_path(root);
    }
    if registered && let Err(e) = config::save(&config) {
        warn!(target: "config", error = %e, "Could not save library folders to config");
    }

    if no_watch {
        config.library.watch_for_changes = false;
    }

    rt.block_on(async {
        let library = Library::open(&config).await?;

        println!("Scanning {} folder(s)...", roots.len());
        let summary = library
            .scan_folders(&roots, |fraction, path| {
                let name = path.file_name().unwrap_or(path.as_os_str());
                print!("\r[{:>3.0}%] {:<60.60}", fraction * 100.0, name.to_string_lossy());
                let _ = std::io::stdout().flush();
            })
            .await?;

        println!(
            "\nScan complete: {} scanned, {} added, {} updated.",
            summary.scanned, summary.added, summary.updated
        );

        wait_while_watching(&library).await
    })
}

/// Watch every registered folder until Ctrl+C.
pub fn cmd_watch(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = Library::open(config).await?;

        let mut roots: Vec<PathBuf> = db::get_watched_folders(library.pool())
            .await?
            .into_iter()
            .map(|f| PathBuf::from(f.path))
            .collect();
        for path in &config.library.paths {
            if !roots.contains(path) {
                roots.push(path.clone());
            }
        }

        if roots.is_empty() {
            anyhow::bail!("No library folders registered. Run `music-index scan <PATH>` first.");
        }

        library.watch(&roots)?;
        wait_while_watching(&library).await
    })
}

async fn wait_while_watching(library: &Library) -> anyhow::Result<()> {
    let roots = library.watched_roots();
    if roots.is_empty() {
        return Ok(());
    }

    for root in &roots {
        println!("Watching for changes in: {}", root.display());
    }
    println!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    library.stop_watching();
    info!(target: "library::watch", "Stopped by user");
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_absolute_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let resolved = absolute(dir.path());
        assert!(resolved.is_absolute());

        let missing = absolute(Path::new("not/here"));
        assert!(missing.is_absolute());
        assert!(missing.ends_with("not/here"));
    }
}
