//! Play history table access

use chrono::{DateTime, Duration, Utc};
use smp_common::time::{parse_db_timestamp, to_db_timestamp};
use smp_common::{HistoryEntry, Track, TrackId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::history::{History, HistoryLog, TrackRef};

/// Load every play at or after `cutoff`
///
/// Rows are pre-filtered by calendar date in SQL and filtered exactly here.
/// Stored timestamps may mix RFC 3339 (with any UTC offset) and SQLite's
/// space-separated form, so the date prefix of a row can be up to a day
/// behind its UTC date; the prefilter starts one day early.
pub async fn load_history_since(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<HistoryLog, StoreError> {
    let cutoff_date = cutoff
        .checked_sub_signed(Duration::days(1))
        .unwrap_or(cutoff)
        .format("%Y-%m-%d")
        .to_string();

    let rows = sqlx::query(
        r#"
        SELECT guid, track_id, path, played_at
        FROM play_history
        WHERE substr(played_at, 1, 10) >= ?
        "#,
    )
    .bind(&cutoff_date)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(entry) = row_to_entry(row)? {
            if entry.played_at >= cutoff {
                entries.push(entry);
            }
        }
    }

    debug!("Loaded {} history entries since {}", entries.len(), cutoff);
    Ok(HistoryLog::from_entries(entries))
}

/// Most recent play of `track`, over the full history
pub async fn last_played_at(
    pool: &SqlitePool,
    track: &Track,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT guid, track_id, path, played_at
        FROM play_history
        WHERE track_id = ? OR (track_id IS NULL AND path = ?)
        "#,
    )
    .bind(track.id.as_str())
    .bind(&track.path)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(entry) = row_to_entry(row)? {
            entries.push(entry);
        }
    }

    HistoryLog::from_entries(entries).last_played(TrackRef::from(track))
}

/// Append a play to the history
pub async fn record_play(pool: &SqlitePool, entry: &HistoryEntry) -> smp_common::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO play_history (guid, track_id, path, played_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(entry.guid.to_string())
    .bind(entry.track_id.as_ref().map(|id| id.as_str()))
    .bind(&entry.path)
    .bind(to_db_timestamp(entry.played_at))
    .execute(pool)
    .await?;

    debug!(
        track_id = ?entry.track_id,
        path = ?entry.path,
        "Recorded play at {}",
        entry.played_at
    );
    Ok(())
}

/// Decode one history row; rows with an unreadable timestamp are skipped
fn row_to_entry(row: &SqliteRow) -> Result<Option<HistoryEntry>, StoreError> {
    let guid: String = row.try_get("guid")?;
    let track_id: Option<String> = row.try_get("track_id")?;
    let path: Option<String> = row.try_get("path")?;
    let played_at: String = row.try_get("played_at")?;

    let played_at = match parse_db_timestamp(&played_at) {
        Ok(ts) => ts,
        Err(e) => {
            warn!(guid = %guid, "Skipping history entry: {}", e);
            return Ok(None);
        }
    };

    Ok(Some(HistoryEntry {
        // guid is informational only
        guid: Uuid::parse_str(&guid).unwrap_or_else(|_| Uuid::nil()),
        track_id: track_id.map(TrackId::from),
        path,
        played_at,
    }))
}
