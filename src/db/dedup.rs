//! Startup migration that merges duplicate artists and albums.
//!
//! Older databases were filled before names were normalized, so the same
//! artist can exist several times under different casing or spacing.
//! [`run`] is safe to call on every launch:
//!
//! 1. add `normalized_name` to `artists`/`albums` if the column is missing
//! 2. backfill it for rows where it is NULL or stale
//! 3. find duplicate groups (artists by name, albums by name + artist)
//! 4. merge each group into its lowest id, repointing foreign keys first
//!
//! Each group is merged in its own transaction. A group that fails is
//! logged and counted, and the remaining groups still run.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};

use super::normalize_name;
use crate::error::Result;

/// Tables carrying a `normalized_name` column.
const NORMALIZED_TABLES: &[&str] = &["artists", "albums"];

/// Foreign keys pointing at `artists.id`.
const ARTIST_REFERENCES: &[(&str, &str)] = &[("tracks", "artist_id"), ("albums", "artist_id")];

/// Foreign keys pointing at `albums.id`.
const ALBUM_REFERENCES: &[(&str, &str)] = &[("tracks", "album_id")];

/// What a migration pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `normalized_name` columns added to legacy tables
    pub columns_added: usize,
    /// Rows whose `normalized_name` was backfilled
    pub backfilled: usize,
    /// Duplicate artist groups found
    pub artist_groups: usize,
    /// Duplicate album groups found
    pub album_groups: usize,
    /// Redundant artist rows deleted
    pub artists_merged: usize,
    /// Redundant album rows deleted
    pub albums_merged: usize,
    /// Groups whose merge failed and was rolled back
    pub failed_groups: usize,
}

/// Run the full migration.
///
/// Artists are merged before albums: repointing `albums.artist_id` can turn
/// two albums into duplicates of each other.
pub async fn run(pool: &SqlitePool) -> Result<MigrationReport> {
    let mut report = MigrationReport {
        columns_added: ensure_normalized_columns(pool).await?,
        backfilled: backfill_normalized_names(pool).await?,
        ..Default::default()
    };

    let artist_groups = find_duplicate_artists(pool).await?;
    report.artist_groups = artist_groups.len();
    for ids in &artist_groups {
        match merge_group(pool, "artists", ARTIST_REFERENCES, ids).await {
            Ok(merged) => {
                report.artists_merged += merged;
                tracing::debug!(target: "db::dedup", keep = ids[0], merged, "Merged artist group");
            }
            Err(e) => {
                report.failed_groups += 1;
                tracing::warn!(target: "db::dedup", ids = ?ids, error = %e, "Failed to merge artist group");
            }
        }
    }

    let album_groups = find_duplicate_albums(pool).await?;
    report.album_groups = album_groups.len();
    for ids in &album_groups {
        match merge_group(pool, "albums", ALBUM_REFERENCES, ids).await {
            Ok(merged) => {
                report.albums_merged += merged;
                tracing::debug!(target: "db::dedup", keep = ids[0], merged, "Merged album group");
            }
            Err(e) => {
                report.failed_groups += 1;
                tracing::warn!(target: "db::dedup", ids = ?ids, error = %e, "Failed to merge album group");
            }
        }
    }

    tracing::info!(
        target: "db::dedup",
        columns_added = report.columns_added,
        backfilled = report.backfilled,
        artist_groups = report.artist_groups,
        album_groups = report.album_groups,
        artists_merged = report.artists_merged,
        albums_merged = report.albums_merged,
        failed_groups = report.failed_groups,
        "Migration complete"
    );

    Ok(report)
}

/// Add `normalized_name` to tables that exist but predate it.
///
/// Tables that don't exist yet are left for the schema migration.
///
/// # Returns
///
/// The number of columns added.
pub async fn ensure_normalized_columns(pool: &SqlitePool) -> Result<usize> {
    let mut added = 0;

    for table in NORMALIZED_TABLES {
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info(?)")
                .bind(*table)
                .fetch_all(pool)
                .await?;

        if columns.is_empty() || columns.iter().any(|(name,)| name == "normalized_name") {
            continue;
        }

        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN normalized_name TEXT"))
            .execute(pool)
            .await?;
        tracing::info!(target: "db::dedup", table = *table, "Added normalized_name column");
        added += 1;
    }

    Ok(added)
}

/// Fill `normalized_name` where it is NULL or no longer matches the name.
///
/// Normalization happens in Rust rather than SQL so non-ASCII names fold
/// exactly like the ones written by the indexer. Rows keyed by an older
/// normalization are rewritten so they group with current inserts.
pub async fn backfill_normalized_names(pool: &SqlitePool) -> Result<usize> {
    let mut count = 0;

    for table in NORMALIZED_TABLES {
        let rows: Vec<(i64, String, Option<String>)> =
            sqlx::query_as(&format!("SELECT id, name, normalized_name FROM {table}"))
                .fetch_all(pool)
                .await?;

        let stale: Vec<(i64, String)> = rows
            .into_iter()
            .filter_map(|(id, name, stored)| {
                let key = normalize_name(&name);
                (stored.as_deref() != Some(key.as_str())).then_some((id, key))
            })
            .collect();

        if stale.is_empty() {
            continue;
        }

        let mut tx = pool.begin().await?;
        let update = format!("UPDATE {table} SET normalized_name = ? WHERE id = ?");
        for (id, key) in &stale {
            sqlx::query(&update)
                .bind(key)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(target: "db::dedup", table = *table, rows = stale.len(), "Backfilled normalized names");
        count += stale.len();
    }

    Ok(count)
}

/// Groups of artist ids sharing a normalized name, each sorted ascending.
pub async fn find_duplicate_artists(pool: &SqlitePool) -> Result<Vec<Vec<i64>>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT GROUP_CONCAT(id) FROM (
            SELECT id, normalized_name FROM artists
            WHERE normalized_name IS NOT NULL
            ORDER BY id
        )
        GROUP BY normalized_name
        HAVING COUNT(*) > 1
        "#,
    )
    .fetch_all(pool)
    .await?;

    let groups: Vec<Vec<i64>> = rows.iter().map(|(ids,)| parse_ids(ids)).collect();
    if !groups.is_empty() {
        tracing::info!(target: "db::dedup", groups = groups.len(), "Found duplicate artists");
    }
    Ok(groups)
}

/// Groups of album ids sharing a normalized name and artist.
pub async fn find_duplicate_albums(pool: &SqlitePool) -> Result<Vec<Vec<i64>>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT GROUP_CONCAT(id) FROM (
            SELECT id, normalized_name, artist_id FROM albums
            WHERE normalized_name IS NOT NULL
            ORDER BY id
        )
        GROUP BY normalized_name, artist_id
        HAVING COUNT(*) > 1
        "#,
    )
    .fetch_all(pool)
    .await?;

    let groups: Vec<Vec<i64>> = rows.iter().map(|(ids,)| parse_ids(ids)).collect();
    if !groups.is_empty() {
        tracing::info!(target: "db::dedup", groups = groups.len(), "Found duplicate albums");
    }
    Ok(groups)
}

fn parse_ids(csv: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = csv.split(',').filter_map(|s| s.trim().parse().ok()).collect();
    ids.sort_unstable();
    ids
}

/// Merge `ids[1..]` into `ids[0]` inside one transaction.
///
/// # Returns
///
/// The number of rows deleted.
async fn merge_group(
    pool: &SqlitePool,
    table: &str,
    references: &[(&str, &str)],
    ids: &[i64],
) -> Result<usize> {
    let Some((&keep, duplicates)) = ids.split_first() else {
        return Ok(0);
    };

    let mut tx = pool.begin().await?;

    for &dup in duplicates {
        for (ref_table, column) in references {
            sqlx::query(&format!("UPDATE {ref_table} SET {column} = ? WHERE {column} = ?"))
                .bind(keep)
                .bind(dup)
                .execute(&mut *tx)
                .await?;
        }

        fill_missing_fields(&mut tx, table, keep, dup).await?;

        sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(dup)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(duplicates.len())
}

/// Copy optional descriptive fields from a duplicate onto the kept row
/// where the kept row has none.
async fn fill_missing_fields(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    keep: i64,
    dup: i64,
) -> Result<()> {
    let columns: &[&str] = match table {
        "artists" => &["cover_url", "description"],
        "albums" => &["year", "cover_path"],
        _ => &[],
    };

    for column in columns {
        sqlx::query(&format!(
            "UPDATE {table} SET {column} = (SELECT {column} FROM {table} WHERE id = ?) \
             WHERE id = ? AND {column} IS NULL"
        ))
        .bind(dup)
        .bind(keep)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, TrackRecord, get_or_create_album, get_or_create_artist, insert_track};
    use crate::test_utils::{mock_track_record, temp_db};

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
        n
    }

    /// Insert an artist the way pre-normalization code did.
    async fn insert_legacy_artist(pool: &SqlitePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO artists (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("3,1,2"), vec![1, 2, 3]);
        assert_eq!(parse_ids("7"), vec![7]);
        assert!(parse_ids("").is_empty());
    }

    #[tokio::test]
    async fn test_run_on_clean_database_is_noop() {
        let (pool, _dir) = temp_db().await;
        let report = run(&pool).await.unwrap();
        assert_eq!(report, MigrationReport::default());
    }

    #[tokio::test]
    async fn test_duplicate_artists_converge_and_references_follow() {
        let (pool, _dir) = temp_db().await;

        let kept = get_or_create_artist(&pool, "Café Tacvba").await.unwrap();
        let dup = insert_legacy_artist(&pool, "café tacvba ").await;
        sqlx::query("UPDATE artists SET description = 'Mexican rock' WHERE id = ?")
            .bind(dup)
            .execute(&pool)
            .await
            .unwrap();

        let dup_album = get_or_create_album(&pool, "Re", Some(dup), None).await.unwrap();
        let track = TrackRecord {
            artist_id: Some(dup),
            album_id: Some(dup_album),
            ..mock_track_record("/music/re/01.mp3")
        };
        insert_track(&pool, &track).await.unwrap();

        let report = run(&pool).await.unwrap();
        assert_eq!(report.backfilled, 1);
        assert_eq!(report.artist_groups, 1);
        assert_eq!(report.artists_merged, 1);
        assert_eq!(report.failed_groups, 0);

        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM artists WHERE normalized_name = 'CAFÉ TACVBA'").await,
            1
        );
        let moved = db::get_track_by_path(&pool, "/music/re/01.mp3").await.unwrap().unwrap();
        assert_eq!(moved.artist_id, Some(kept));

        let (album_artist, description): (Option<i64>, Option<String>) = sqlx::query_as(
            "SELECT al.artist_id, a.description FROM albums al JOIN artists a ON a.id = al.artist_id WHERE al.id = ?",
        )
        .bind(dup_album)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(album_artist, Some(kept));
        assert_eq!(description.as_deref(), Some("Mexican rock"));
    }

    #[tokio::test]
    async fn test_artist_merge_cascades_into_album_merge() {
        let (pool, _dir) = temp_db().await;

        let a1 = get_or_create_artist(&pool, "Portishead").await.unwrap();
        let a2 = insert_legacy_artist(&pool, "PORTISHEAD").await;
        let album1 = get_or_create_album(&pool, "Dummy", Some(a1), None).await.unwrap();
        let album2 = get_or_create_album(&pool, "dummy", Some(a2), Some(1994)).await.unwrap();

        let t1 = TrackRecord {
            artist_id: Some(a1),
            album_id: Some(album1),
            ..mock_track_record("/m/1.flac")
        };
        let t2 = TrackRecord {
            artist_id: Some(a2),
            album_id: Some(album2),
            ..mock_track_record("/m/2.flac")
        };
        insert_track(&pool, &t1).await.unwrap();
        insert_track(&pool, &t2).await.unwrap();

        let report = run(&pool).await.unwrap();
        assert_eq!(report.artists_merged, 1);
        assert_eq!(report.album_groups, 1);
        assert_eq!(report.albums_merged, 1);

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM albums").await, 1);
        assert_eq!(
            count(&pool, "SELECT COUNT(DISTINCT album_id) FROM tracks").await,
            1
        );
        let (year,): (Option<i64>,) = sqlx::query_as("SELECT year FROM albums WHERE id = ?")
            .bind(album1)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(year, Some(1994));
    }

    #[tokio::test]
    async fn test_same_album_name_different_artists_not_merged() {
        let (pool, _dir) = temp_db().await;

        let a = get_or_create_artist(&pool, "Weezer").await.unwrap();
        let b = get_or_create_artist(&pool, "Peter Gabriel").await.unwrap();
        get_or_create_album(&pool, "Self-Titled", Some(a), None).await.unwrap();
        get_or_create_album(&pool, "Self-Titled", Some(b), None).await.unwrap();

        let report = run(&pool).await.unwrap();
        assert_eq!(report.album_groups, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM albums").await, 2);
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let (pool, _dir) = temp_db().await;

        get_or_create_artist(&pool, "Björk").await.unwrap();
        insert_legacy_artist(&pool, "  björk").await;
        insert_legacy_artist(&pool, "BJÖRK").await;

        let first = run(&pool).await.unwrap();
        assert_eq!(first.artists_merged, 2);

        let second = run(&pool).await.unwrap();
        assert_eq!(second, MigrationReport::default());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM artists").await, 1);
    }

    #[tokio::test]
    async fn test_stale_normalized_names_are_rewritten() {
        let (pool, _dir) = temp_db().await;

        // Keyed by an older normalization that collapsed inner spaces.
        sqlx::query(
            "INSERT INTO artists (name, normalized_name) VALUES ('Sigur  Ros', 'SIGUR ROS')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let current = get_or_create_artist(&pool, "Sigur  Ros").await.unwrap();

        let report = run(&pool).await.unwrap();
        assert_eq!(report.backfilled, 1);
        assert_eq!(report.artists_merged, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM artists").await, 1);

        let kept = get_or_create_artist(&pool, "Sigur  Ros").await.unwrap();
        assert_ne!(kept, current);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM artists").await, 1);
    }

    #[tokio::test]
    async fn test_failed_group_does_not_stop_others() {
        let (pool, _dir) = temp_db().await;

        get_or_create_artist(&pool, "Locked").await.unwrap();
        insert_legacy_artist(&pool, "locked ").await;
        get_or_create_artist(&pool, "Good").await.unwrap();
        insert_legacy_artist(&pool, "good").await;

        sqlx::query(
            "CREATE TRIGGER block_locked BEFORE DELETE ON artists \
             WHEN OLD.normalized_name = 'LOCKED' \
             BEGIN SELECT RAISE(ABORT, 'locked'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = run(&pool).await.unwrap();
        assert_eq!(report.artist_groups, 2);
        assert_eq!(report.failed_groups, 1);
        assert_eq!(report.artists_merged, 1);

        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM artists WHERE normalized_name = 'LOCKED'").await,
            2
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM artists WHERE normalized_name = 'GOOD'").await,
            1
        );
    }

    #[tokio::test]
    async fn test_legacy_schema_gets_normalized_columns() {
        let dir = tempfile::tempdir().unwrap();
        let url = db::db_url(Some(&dir.path().join("legacy.db")));

        {
            use sqlx::migrate::MigrateDatabase;
            sqlx::Sqlite::create_database(&url).await.unwrap();
            let legacy = SqlitePool::connect(&url).await.unwrap();
            sqlx::query(
                "CREATE TABLE artists (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
                 cover_url TEXT, description TEXT, created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            )
            .execute(&legacy)
            .await
            .unwrap();
            sqlx::query("INSERT INTO artists (name) VALUES ('Air'), ('AIR '), ('Daft Punk')")
                .execute(&legacy)
                .await
                .unwrap();
            legacy.close().await;
        }

        let pool = db::init_db(&url).await.unwrap();
        let report = run(&pool).await.unwrap();

        // init_db already added the artists column before the schema ran
        assert_eq!(report.columns_added, 0);
        assert_eq!(report.backfilled, 3);
        assert_eq!(report.artists_merged, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM artists").await, 2);
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM artists WHERE normalized_name IS NULL").await,
            0
        );
    }
}
