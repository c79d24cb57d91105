//! Core data models for the music index.
//!
//! Defines the persisted entities: [`Folder`], [`Artist`], [`Album`] and
//! [`Track`]. These derive SQLx's `FromRow` for database mapping.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `folders` - Watched library roots
//! - `artists` - Artists, deduplicated on `normalized_name`
//! - `albums` - Albums, deduplicated on `(normalized_name, artist_id)`
//! - `tracks` - Individual audio files, unique by `path` and by `hash`

use sqlx::FromRow;

/// A library root registered by the user.
#[derive(Debug, Clone, FromRow)]
pub struct Folder {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Absolute directory path (unique)
    pub path: String,
    /// Whether the folder is watched for changes
    pub is_watched: bool,
    pub created_at: String,
}

/// An artist in the music library.
#[derive(Debug, Clone, FromRow)]
pub struct Artist {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Artist name as first seen in tags
    pub name: String,
    /// Trimmed, uppercased name; NULL only before migration backfill
    pub normalized_name: Option<String>,
    pub cover_url: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

/// An album in the music library.
#[derive(Debug, Clone, FromRow)]
pub struct Album {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Album name as first seen in tags
    pub name: String,
    pub normalized_name: Option<String>,
    /// Optional artist ID (albums can exist without artist)
    pub artist_id: Option<i64>,
    /// Release year (optional)
    pub year: Option<i64>,
    pub cover_path: Option<String>,
    pub created_at: String,
}

/// A track (audio file) in the music library.
#[derive(Debug, Clone, FromRow)]
pub struct Track {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Absolute file path (unique identifier)
    pub path: String,
    /// Library root the file was found under
    pub folder_id: Option<i64>,
    /// Track title (from metadata or filename)
    pub title: String,
    /// Foreign key to artists table
    pub artist_id: Option<i64>,
    /// Foreign key to albums table
    pub album_id: Option<i64>,
    /// Track number on album
    pub track_no: Option<i64>,
    /// Disc number, 1 when untagged
    pub disc_no: Option<i64>,
    pub duration_ms: Option<i64>,
    /// Audio bitrate in kbps
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    /// Fingerprint of (path, size, mtime), see [`crate::scanner::fingerprint`]
    pub hash: String,
    pub created_at: String,
    pub updated_at: String,
}
