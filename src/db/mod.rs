//! Database module for folder, track, artist, and album persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Watched folder registration
//! - Artist and album get-or-create keyed by normalized name
//! - Track insert/update/delete keyed by path
//!
//! Duplicate artist/album cleanup lives in [`dedup`].
//!
//! # Example
//!
//! ```ignore
//! use music_index::db::{init_db, get_all_tracks_with_metadata};
//!
//! let pool = init_db("sqlite:music.db").await?;
//! let tracks = get_all_tracks_with_metadata(&pool).await?;
//! ```

pub mod dedup;

use std::path::Path;

use chrono::Utc;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{Result, ResultExt};
use crate::model::{Album, Artist, Folder, Track};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_index.db";

/// Artist name used when a file carries neither artist nor album artist.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Album name used when a file carries no album tag.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

const TRACK_COLUMNS: &str = "id, path, folder_id, title, artist_id, album_id, track_no, disc_no, \
     duration_ms, bitrate, sample_rate, year, genre, hash, created_at, updated_at";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, upgrades legacy artist/album tables that
/// predate `normalized_name`, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    // Must precede the schema migration, whose indexes reference the column
    dedup::ensure_normalized_columns(&pool).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Open the database file at `path`, creating it and its parent directory
/// if needed.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(format!("create {}", parent.display()))?;
    }
    init_db(&db_url(Some(path))).await
}

/// Deduplication key: surrounding whitespace trimmed, then Unicode uppercase.
///
/// Inner whitespace is kept as-is.
///
/// ```ignore
/// assert_eq!(normalize_name("  café tacvba "), "CAFÉ TACVBA");
/// assert_eq!(normalize_name("Sigur  Ros"), "SIGUR  ROS");
/// ```
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Folders
// ============================================================================

/// Register a library root, marking it watched.
///
/// Idempotent: re-registering returns the existing ID.
pub async fn register_folder(pool: &SqlitePool, path: &Path) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO folders (path, is_watched, created_at)
        VALUES (?, 1, ?)
        ON CONFLICT(path) DO UPDATE SET is_watched = 1
        RETURNING id
        "#,
    )
    .bind(path.to_string_lossy().as_ref())
    .bind(now())
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// All registered folders, watched or not.
pub async fn get_all_folders(pool: &SqlitePool) -> sqlx::Result<Vec<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT id, path, is_watched, created_at FROM folders ORDER BY path",
    )
    .fetch_all(pool)
    .await
}

/// Folders flagged for change notification.
pub async fn get_watched_folders(pool: &SqlitePool) -> sqlx::Result<Vec<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT id, path, is_watched, created_at FROM folders WHERE is_watched = 1 ORDER BY path",
    )
    .fetch_all(pool)
    .await
}

/// Find the registered folder that contains `path` (deepest match wins).
pub async fn folder_id_for_path(pool: &SqlitePool, path: &Path) -> sqlx::Result<Option<i64>> {
    let folders = get_all_folders(pool).await?;

    Ok(folders
        .iter()
        .filter(|f| path.starts_with(&f.path))
        .max_by_key(|f| f.path.len())
        .map(|f| f.id))
}

// ============================================================================
// Artists and albums
// ============================================================================

/// Get or create an artist by normalized name.
///
/// Names that differ only by case or surrounding whitespace resolve to the
/// same row.
/// If duplicates exist (before migration merges them), the oldest wins.
///
/// # Returns
///
/// The database ID of the (existing or new) artist.
pub async fn get_or_create_artist(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    let normalized = normalize_name(name);

    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM artists WHERE normalized_name = ? ORDER BY id LIMIT 1")
            .bind(&normalized)
            .fetch_optional(pool)
            .await?;

    if let Some((id,)) = row {
        Ok(id)
    } else {
        let result = sqlx::query(
            "INSERT INTO artists (name, normalized_name, created_at) VALUES (?, ?, ?)",
        )
        .bind(name.trim())
        .bind(&normalized)
        .bind(now())
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Get or create an album by normalized name and artist.
///
/// Albums are scoped to their artist: two artists may own same-named albums.
/// A year is filled in on an existing album that has none.
///
/// # Returns
///
/// The database ID of the (existing or new) album.
pub async fn get_or_create_album(
    pool: &SqlitePool,
    name: &str,
    artist_id: Option<i64>,
    year: Option<i64>,
) -> sqlx::Result<i64> {
    let normalized = normalize_name(name);

    let row: Option<(i64, Option<i64>)> = sqlx::query_as(
        "SELECT id, year FROM albums WHERE normalized_name = ? AND artist_id IS ? ORDER BY id LIMIT 1",
    )
    .bind(&normalized)
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((id, existing_year)) => {
            if existing_year.is_none() && year.is_some() {
                sqlx::query("UPDATE albums SET year = ? WHERE id = ?")
                    .bind(year)
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
            Ok(id)
        }
        None => {
            let result = sqlx::query(
                "INSERT INTO albums (name, normalized_name, artist_id, year, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name.trim())
            .bind(&normalized)
            .bind(artist_id)
            .bind(year)
            .bind(now())
            .execute(pool)
            .await?;
            Ok(result.last_insert_rowid())
        }
    }
}

/// Get all artists ordered by name.
pub async fn get_all_artists(pool: &SqlitePool) -> sqlx::Result<Vec<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, normalized_name, cover_url, description, created_at \
         FROM artists ORDER BY name, id",
    )
    .fetch_all(pool)
    .await
}

/// Get all albums ordered by name.
pub async fn get_all_albums(pool: &SqlitePool) -> sqlx::Result<Vec<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, normalized_name, artist_id, year, cover_path, created_at \
         FROM albums ORDER BY name, id",
    )
    .fetch_all(pool)
    .await
}

// ============================================================================
// Tracks
// ============================================================================

/// Derived fields written for a track on insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecord {
    pub path: String,
    pub folder_id: Option<i64>,
    pub title: String,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    pub track_no: Option<i64>,
    pub disc_no: i64,
    pub duration_ms: Option<i64>,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub hash: String,
}

/// Insert a new track row.
///
/// # Returns
///
/// The database ID of the inserted track.
pub async fn insert_track(pool: &SqlitePool, track: &TrackRecord) -> sqlx::Result<i64> {
    let now = now();
    let result = sqlx::query(
        r#"
        INSERT INTO tracks (
            path, folder_id, title, artist_id, album_id, track_no, disc_no,
            duration_ms, bitrate, sample_rate, year, genre, hash, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&track.path)
    .bind(track.folder_id)
    .bind(&track.title)
    .bind(track.artist_id)
    .bind(track.album_id)
    .bind(track.track_no)
    .bind(track.disc_no)
    .bind(track.duration_ms)
    .bind(track.bitrate)
    .bind(track.sample_rate)
    .bind(track.year)
    .bind(&track.genre)
    .bind(&track.hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrite every derived field and the fingerprint of an existing track.
pub async fn update_track(pool: &SqlitePool, track_id: i64, track: &TrackRecord) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE tracks SET
            path = ?, folder_id = COALESCE(?, folder_id), title = ?, artist_id = ?, album_id = ?,
            track_no = ?, disc_no = ?, duration_ms = ?, bitrate = ?, sample_rate = ?,
            year = ?, genre = ?, hash = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&track.path)
    .bind(track.folder_id)
    .bind(&track.title)
    .bind(track.artist_id)
    .bind(track.album_id)
    .bind(track.track_no)
    .bind(track.disc_no)
    .bind(track.duration_ms)
    .bind(track.bitrate)
    .bind(track.sample_rate)
    .bind(track.year)
    .bind(&track.genre)
    .bind(&track.hash)
    .bind(now())
    .bind(track_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a track by its database ID.
pub async fn get_track_by_id(pool: &SqlitePool, track_id: i64) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
        .bind(track_id)
        .fetch_optional(pool)
        .await
}

/// Get a track by its absolute file path.
pub async fn get_track_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE path = ?"))
        .bind(path)
        .fetch_optional(pool)
        .await
}

/// Get all tracks from the database.
///
/// Returns raw rows without joined artist/album names.
/// For display purposes, prefer [`get_all_tracks_with_metadata`].
pub async fn get_all_tracks(pool: &SqlitePool) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks ORDER BY path"))
        .fetch_all(pool)
        .await
}

/// Delete the track stored for `path`.
///
/// Artist and album rows are left in place even if nothing references them
/// any more.
///
/// # Returns
///
/// `true` if a row was removed.
pub async fn delete_track_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM tracks WHERE path = ?")
        .bind(path)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every track stored under the directory `dir`.
///
/// # Returns
///
/// The number of rows removed.
pub async fn delete_tracks_under(pool: &SqlitePool, dir: &Path) -> sqlx::Result<u64> {
    let mut prefix = dir.to_string_lossy().into_owned();
    if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
        prefix.push(std::path::MAIN_SEPARATOR);
    }

    let result = sqlx::query("DELETE FROM tracks WHERE substr(path, 1, length(?)) = ?")
        .bind(&prefix)
        .bind(&prefix)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Track with joined artist and album names.
///
/// Used for listing where human-readable names are needed rather than
/// foreign key IDs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackWithMetadata {
    /// Database ID
    pub id: i64,
    /// Track title
    pub title: String,
    /// File path
    pub path: String,
    pub duration_ms: Option<i64>,
    /// Track number on album
    pub track_no: Option<i64>,
    /// Artist name (or "Unknown Artist")
    pub artist_name: String,
    /// Album name (or "Unknown Album")
    pub album_name: String,
    /// Release year (track tag, falling back to album)
    pub year: Option<i64>,
}

/// Get all tracks with artist and album names.
///
/// Performs a LEFT JOIN to include tracks even if they have no artist
/// or album.
pub async fn get_all_tracks_with_metadata(
    pool: &SqlitePool,
) -> sqlx::Result<Vec<TrackWithMetadata>> {
    sqlx::query_as::<_, TrackWithMetadata>(
        r#"
        SELECT
            t.id, t.title, t.path, t.duration_ms, t.track_no,
            COALESCE(a.name, 'Unknown Artist') as artist_name,
            COALESCE(al.name, 'Unknown Album') as album_name,
            COALESCE(t.year, al.year) as year
        FROM tracks t
        LEFT JOIN artists a ON t.artist_id = a.id
        LEFT JOIN albums al ON t.album_id = al.id
        ORDER BY artist_name, album_name, t.disc_no, t.track_no, t.title
        "#,
    )
    .fetch_all(pool)
    .await
}
