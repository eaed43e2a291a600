//! Catalog table access

use smp_common::db::models::{decode_embedding, encode_embedding};
use smp_common::{Track, TrackId};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::catalog::CatalogSnapshot;
use crate::error::StoreError;

/// Load every catalog track into a snapshot
///
/// A malformed embedding loads as missing; the selector then counts the
/// track as unscoreable.
pub async fn load_catalog(pool: &SqlitePool) -> Result<CatalogSnapshot, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, path, mbid, title, album, genre, year, album_type, embedding
        FROM tracks
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut tracks = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.try_get("id")?;
        let path: String = row.try_get("path")?;

        let embedding = match row.try_get::<Option<String>, _>("embedding")? {
            Some(json) => match decode_embedding(&json) {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!(track_id = %id, path = %path, "Ignoring stored embedding: {}", e);
                    None
                }
            },
            None => None,
        };

        let year = row
            .try_get::<Option<i64>, _>("year")?
            .and_then(|y| i32::try_from(y).ok());

        tracks.push(Track {
            id: TrackId::from(id),
            path,
            mbid: row.try_get("mbid")?,
            title: row.try_get("title")?,
            album: row.try_get("album")?,
            genre: row.try_get("genre")?,
            year,
            album_type: row.try_get("album_type")?,
            embedding,
        });
    }

    debug!("Loaded catalog snapshot with {} tracks", tracks.len());
    Ok(CatalogSnapshot::from_tracks(tracks))
}

/// Catalog id of the track stored at `path`
pub async fn find_track_id_by_path(
    pool: &SqlitePool,
    path: &str,
) -> Result<Option<TrackId>, StoreError> {
    let id: Option<String> = sqlx::query_scalar("SELECT id FROM tracks WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?;

    Ok(id.map(TrackId::from))
}

/// Insert or update a catalog track by id
///
/// Accepts a pool or an open transaction.
pub async fn save_track<'e, E>(executor: E, track: &Track) -> smp_common::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let embedding = track
        .embedding
        .as_deref()
        .map(encode_embedding)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO tracks (
            id, path, mbid, title, album, genre, year, album_type, embedding,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            mbid = excluded.mbid,
            title = excluded.title,
            album = excluded.album,
            genre = excluded.genre,
            year = excluded.year,
            album_type = excluded.album_type,
            embedding = excluded.embedding,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(track.id.as_str())
    .bind(&track.path)
    .bind(&track.mbid)
    .bind(&track.title)
    .bind(&track.album)
    .bind(&track.genre)
    .bind(track.year)
    .bind(&track.album_type)
    .bind(embedding)
    .execute(executor)
    .await?;

    Ok(())
}
