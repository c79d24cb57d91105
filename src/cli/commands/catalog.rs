//! Migration, cover export and listing commands.

use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db;
use crate::library::Library;

/// Run the duplicate-merging migration and print its report.
pub fn cmd_migrate(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::open(&config.database_path()).await?;
        let report = db::dedup::run(&pool).await?;

        println!("Migration complete:");
        println!("  columns added:      {}", report.columns_added);
        println!("  names backfilled:   {}", report.backfilled);
        println!("  artist groups:      {}", report.artist_groups);
        println!("  album groups:       {}", report.album_groups);
        println!("  artists merged:     {}", report.artists_merged);
        println!("  albums merged:      {}", report.albums_merged);
        if report.failed_groups > 0 {
            println!("  failed groups:      {} (see log)", report.failed_groups);
        }
        anyhow::Ok(())
    })
}

/// Write a track's cover art to a file.
pub fn cmd_cover(
    rt: &Runtime,
    config: &Config,
    track_id: i64,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = Library::open(config).await?;

        let Some(bytes) = library.cover_for_track(track_id).await else {
            println!("No cover art for track {track_id}.");
            return Ok(());
        };

        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("cover-{track_id}.jpg")));
        std::fs::write(&output, &bytes)?;
        println!("Wrote {} bytes to {}", bytes.len(), output.display());
        anyhow::Ok(())
    })
}

/// List all tracks in the database
pub fn cmd_list(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::open(&config.database_path()).await?;
        let tracks = db::get_all_tracks_with_metadata(&pool).await?;

        for track in &tracks {
            println!(
                "{:>6}  {} - {} - {}",
                track.id, track.artist_name, track.album_name, track.title
            );
        }
        let artists = db::get_all_artists(&pool).await?;
        let albums = db::get_all_albums(&pool).await?;
        println!(
            "{} track(s), {} artist(s), {} album(s)",
            tracks.len(),
            artists.len(),
            albums.len()
        );
        anyhow::Ok(())
    })
}

/// List registered library folders
pub fn cmd_folders(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::open(&config.database_path()).await?;
        let folders = db::get_all_folders(&pool).await?;

        if folders.is_empty() {
            println!("No folders registered.");
        }
        for folder in folders {
            let status = if folder.is_watched { "watched" } else { "inactive" };
            println!("{:>4}  [{status}] {}", folder.id, folder.path);
        }
        anyhow::Ok(())
    })
}
