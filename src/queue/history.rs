//! Append-only download history log.
//!
//! One row is written each time a queue item reaches `completed`, including
//! partial successes. Rows are independent of the queue row: removing or
//! clearing queue items never touches history, and triggers reject any
//! `UPDATE` or `DELETE` against the table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use tracing::instrument;

use super::item::{from_micros, now_utc};
use super::{Queue, Result};

const DEFAULT_HISTORY_LIMIT: usize = 200;
const MAX_HISTORY_LIMIT: usize = 10_000;

/// Input payload for one history row.
#[derive(Debug, Clone, Copy)]
pub struct NewHistoryRecord<'a> {
    /// Queue item id the row belongs to.
    pub track_id: &'a str,
    /// Resolved title.
    pub title: &'a str,
    /// Resolved artist.
    pub artist: &'a str,
    /// Resolved album.
    pub album: &'a str,
    /// File (track) or directory (composite) written.
    pub file_path: &'a str,
    /// Bytes written for the item.
    pub file_size_bytes: u64,
    /// Quality label the item was downloaded at.
    pub quality: &'a str,
}

/// Query filters for history reads.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Only rows for this queue item id.
    pub track_id: Option<String>,
    /// Lower timestamp bound (`downloaded_at >= since`).
    pub since: Option<DateTime<Utc>>,
    /// Row-id upper bound (`id < before_id`) for pagination.
    pub before_id: Option<i64>,
    /// Max rows to return (0 uses default).
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            track_id: None,
            since: None,
            before_id: None,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Read model for persisted history rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    /// Row id.
    pub id: i64,
    /// Queue item id.
    pub track_id: String,
    /// Title at download time.
    pub title: String,
    /// Artist at download time.
    pub artist: String,
    /// Album at download time.
    pub album: String,
    /// Written path.
    pub file_path: String,
    /// Bytes written.
    pub file_size_bytes: u64,
    /// Quality label.
    pub quality: String,
    /// Row creation time.
    pub downloaded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for HistoryRecord {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let size: i64 = row.try_get("file_size_bytes")?;
        Ok(Self {
            id: row.try_get("id")?,
            track_id: row.try_get("track_id")?,
            title: row.try_get("title")?,
            artist: row.try_get("artist")?,
            album: row.try_get("album")?,
            file_path: row.try_get("file_path")?,
            file_size_bytes: u64::try_from(size).unwrap_or_default(),
            quality: row.try_get("quality")?,
            downloaded_at: from_micros(row.try_get("downloaded_at")?, "downloaded_at")?,
        })
    }
}

impl Queue {
    /// Returns the latest persisted history row id.
    ///
    /// # Errors
    ///
    /// Returns database errors when query execution fails.
    #[instrument(skip(self))]
    pub async fn latest_history_id(&self) -> Result<Option<i64>> {
        let latest =
            sqlx::query_scalar::<_, Option<i64>>(r"SELECT MAX(id) FROM download_history")
                .fetch_one(self.db.pool())
                .await?;
        Ok(latest)
    }

    /// Appends one history row.
    ///
    /// Callers on the success path log failures from this method and carry on;
    /// a missing history row never reverts a completed download.
    ///
    /// # Errors
    ///
    /// Returns database errors when the insert fails.
    #[instrument(skip(self, record), fields(item_id = %record.track_id))]
    pub async fn add_to_history(&self, record: &NewHistoryRecord<'_>) -> Result<i64> {
        let size = i64::try_from(record.file_size_bytes).unwrap_or(i64::MAX);
        let row = sqlx::query(
            r"INSERT INTO download_history (
                track_id, title, artist, album, file_path, file_size_bytes, quality, downloaded_at
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(record.track_id)
        .bind(record.title)
        .bind(record.artist)
        .bind(record.album)
        .bind(record.file_path)
        .bind(size)
        .bind(record.quality)
        .bind(now_utc().timestamp_micros())
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Reads history rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns database errors when query execution fails.
    #[instrument(skip(self, query))]
    pub async fn query_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            r"SELECT * FROM download_history
              WHERE (?1 IS NULL OR track_id = ?1)
                AND (?2 IS NULL OR downloaded_at >= ?2)
                AND (?3 IS NULL OR id < ?3)
              ORDER BY id DESC
              LIMIT ?4",
        )
        .bind(query.track_id.as_deref())
        .bind(query.since.map(|since| since.timestamp_micros()))
        .bind(query.before_id)
        .bind(normalize_history_limit(query.limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }
}

fn normalize_history_limit(limit: usize) -> i64 {
    let clamped = if limit == 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        limit.min(MAX_HISTORY_LIMIT)
    };
    i64::try_from(clamped).unwrap_or(i64::MAX)
}
