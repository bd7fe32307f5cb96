//! Durable queue store for download items.
//!
//! This module provides `SQLite`-backed persistence for queue items moving
//! through their lifecycle (pending → downloading → completed/failed, with
//! paused as a resumable side state), plus the append-only download history.
//!
//! # Overview
//!
//! - [`Queue`] - Store interface; every write is a single conditional statement
//! - [`QueueItem`] - Individual queue entry
//! - [`QueueStatus`] / [`ItemKind`] - Lifecycle states and catalog kinds
//! - [`QueueError`] - Operation error types
//!
//! Every write stamps `updated_at` with `MAX(now, updated_at + 1µs)`, so the
//! column is strictly increasing per row even when two writes land in the
//! same microsecond.
//!
//! # Example
//!
//! ```no_run
//! use mediafetch_core::queue::{EnqueueHints, ItemKind, Queue, QueueItem};
//! use mediafetch_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("queue.db")).await?;
//! let queue = Queue::new(db);
//!
//! queue.add(&QueueItem::new("alb-1", ItemKind::Album, EnqueueHints::default())).await?;
//!
//! if let Some(item) = queue.claim_next().await? {
//!     println!("claimed {}", item.id);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod history;
mod item;
mod repository;

pub use error::{QueueDbErrorKind, QueueError};
pub use history::{HistoryQuery, HistoryRecord, NewHistoryRecord};
pub use item::{EnqueueHints, ItemKind, QueueItem, QueueStatus, StopRequest};
pub use repository::QueueRepository;

pub(crate) use item::now_utc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::db::Database;

/// Error message persisted when the user cancels an item.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Per-status item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Items waiting to be claimed.
    pub pending: u64,
    /// Items held by a worker.
    pub downloading: u64,
    /// Items paused by the user.
    pub paused: u64,
    /// Finished items, partial successes included.
    pub completed: u64,
    /// Terminally failed items.
    pub failed: u64,
}

impl QueueStats {
    /// Total number of items in the queue.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pending + self.downloading + self.paused + self.completed + self.failed
    }

    /// Count for one status.
    #[must_use]
    pub fn get(&self, status: QueueStatus) -> u64 {
        match status {
            QueueStatus::Pending => self.pending,
            QueueStatus::Downloading => self.downloading,
            QueueStatus::Paused => self.paused,
            QueueStatus::Completed => self.completed,
            QueueStatus::Failed => self.failed,
        }
    }

    fn slot(&mut self, status: QueueStatus) -> &mut u64 {
        match status {
            QueueStatus::Pending => &mut self.pending,
            QueueStatus::Downloading => &mut self.downloading,
            QueueStatus::Paused => &mut self.paused,
            QueueStatus::Completed => &mut self.completed,
            QueueStatus::Failed => &mut self.failed,
        }
    }
}

/// Queue store for download items.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Queue {
    db: Database,
}

impl Queue {
    /// Creates a new queue store over the given database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persists a new item exactly as given.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DuplicateId`] if an item with the same id exists.
    /// Returns [`QueueError::Database`] if the insert fails.
    #[instrument(skip(self, item), fields(item_id = %item.id, kind = %item.kind))]
    pub async fn add(&self, item: &QueueItem) -> Result<QueueItem> {
        let inserted = sqlx::query_as::<_, QueueItem>(
            r"INSERT INTO queue (
                id, kind, title, artist, album, status, progress,
                output_path, download_url, error_message, retry_count,
                total_tracks, completed_tracks, completed_children, failed_children,
                bytes_downloaded, queued_at, not_before, created_at, updated_at, completed_at
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO NOTHING
              RETURNING *",
        )
        .bind(&item.id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.artist)
        .bind(&item.album)
        .bind(item.status.as_str())
        .bind(i64::from(item.progress.min(100)))
        .bind(item.output_path.as_deref())
        .bind(item.download_url.as_deref())
        .bind(item.error_message.as_deref())
        .bind(i64::from(item.retry_count))
        .bind(i64::from(item.total_tracks))
        .bind(i64::from(item.completed_tracks.min(item.total_tracks)))
        .bind(QueueItem::serialize_children(&item.completed_children))
        .bind(QueueItem::serialize_children(&item.failed_children))
        .bind(to_sql_count(item.bytes_downloaded))
        .bind(item.queued_at.timestamp_micros())
        .bind(item.not_before.map(|t| t.timestamp_micros()))
        .bind(item.created_at.timestamp_micros())
        .bind(item.updated_at.timestamp_micros())
        .bind(item.completed_at.map(|t| t.timestamp_micros()))
        .fetch_optional(self.db.pool())
        .await?;

        inserted.ok_or_else(|| QueueError::DuplicateId(item.id.clone()))
    }

    /// Overwrites the mutable fields of an existing item.
    ///
    /// `id`, `kind` and `created_at` are never changed. `completed_at`, once
    /// set, keeps its first value until the item is explicitly reset. The
    /// stored stop request is kept while the item stays downloading and
    /// cleared as soon as it leaves.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no item exists with the given id.
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self, item), fields(item_id = %item.id, status = %item.status))]
    pub async fn update(&self, item: &QueueItem) -> Result<QueueItem> {
        let completed_at = item.completed_at.map(|t| t.timestamp_micros());
        let updated = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET title = ?1,
                  artist = ?2,
                  album = ?3,
                  status = ?4,
                  progress = ?5,
                  output_path = ?6,
                  download_url = ?7,
                  error_message = ?8,
                  retry_count = ?9,
                  total_tracks = ?10,
                  completed_tracks = ?11,
                  completed_children = ?12,
                  failed_children = ?13,
                  bytes_downloaded = ?14,
                  queued_at = ?15,
                  not_before = ?16,
                  completed_at = CASE WHEN ?17 IS NULL THEN NULL ELSE COALESCE(completed_at, ?17) END,
                  stop_request = CASE WHEN ?4 = 'downloading' THEN stop_request ELSE NULL END,
                  updated_at = MAX(?18, updated_at + 1)
              WHERE id = ?19
              RETURNING *",
        )
        .bind(&item.title)
        .bind(&item.artist)
        .bind(&item.album)
        .bind(item.status.as_str())
        .bind(i64::from(item.progress.min(100)))
        .bind(item.output_path.as_deref())
        .bind(item.download_url.as_deref())
        .bind(item.error_message.as_deref())
        .bind(i64::from(item.retry_count))
        .bind(i64::from(item.total_tracks))
        .bind(i64::from(item.completed_tracks.min(item.total_tracks)))
        .bind(QueueItem::serialize_children(&item.completed_children))
        .bind(QueueItem::serialize_children(&item.failed_children))
        .bind(to_sql_count(item.bytes_downloaded))
        .bind(item.queued_at.timestamp_micros())
        .bind(item.not_before.map(|t| t.timestamp_micros()))
        .bind(completed_at)
        .bind(now_micros())
        .bind(&item.id)
        .fetch_optional(self.db.pool())
        .await?;

        updated.ok_or_else(|| QueueError::ItemNotFound(item.id.clone()))
    }

    /// Gets a queue item by id, if present.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>(r"SELECT * FROM queue WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(item)
    }

    /// Gets a queue item by id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no item exists with the given id.
    /// Returns [`QueueError::Database`] if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<QueueItem> {
        self.get(id)
            .await?
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()))
    }

    /// Lists items ordered by creation time, ties broken by id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_all(&self, offset: usize, limit: usize) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(
            r"SELECT * FROM queue
              ORDER BY created_at ASC, id ASC
              LIMIT ? OFFSET ?",
        )
        .bind(to_sql_limit(limit))
        .bind(to_sql_limit(offset))
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    /// Lists items in one status, in the same order as [`Queue::get_all`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_status(
        &self,
        status: QueueStatus,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(
            r"SELECT * FROM queue
              WHERE status = ?
              ORDER BY created_at ASC, id ASC
              LIMIT ? OFFSET ?",
        )
        .bind(status.as_str())
        .bind(to_sql_limit(limit))
        .bind(to_sql_limit(offset))
        .fetch_all(self.db.pool())
        .await?;

        Ok(items)
    }

    /// Returns per-status counts computed in the database.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query(r"SELECT status, COUNT(*) AS count FROM queue GROUP BY status")
            .fetch_all(self.db.pool())
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            if let Ok(status) = status.parse::<QueueStatus>() {
                *stats.slot(status) = u64::try_from(count).unwrap_or_default();
            }
        }

        Ok(stats)
    }

    /// Counts items by status.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: QueueStatus) -> Result<i64> {
        let result = sqlx::query(r"SELECT COUNT(*) as count FROM queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;

        Ok(result.get("count"))
    }

    /// Claims the oldest claimable pending item for processing.
    ///
    /// A single `UPDATE ... RETURNING` moves the item from pending to
    /// downloading, so two concurrent claimers can never receive the same
    /// item. Items whose backoff deadline (`not_before`) lies in the future
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = 'downloading',
                  not_before = NULL,
                  stop_request = NULL,
                  updated_at = MAX(?1, updated_at + 1)
              WHERE id = (
                  SELECT id FROM queue
                  WHERE status = 'pending'
                    AND (not_before IS NULL OR not_before <= ?1)
                  ORDER BY queued_at ASC, id ASC
                  LIMIT 1
              )
                AND status = 'pending'
              RETURNING *",
        )
        .bind(now_micros())
        .fetch_optional(self.db.pool())
        .await?;

        if let Some(item) = &item {
            debug!(item_id = %item.id, "claimed queue item");
        }
        Ok(item)
    }

    /// Earliest backoff deadline among pending items, if any is in the future.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn next_not_before(&self) -> Result<Option<DateTime<Utc>>> {
        let next = sqlx::query_scalar::<_, Option<i64>>(
            r"SELECT MIN(not_before) FROM queue
              WHERE status = 'pending' AND not_before > ?",
        )
        .bind(now_micros())
        .fetch_one(self.db.pool())
        .await?;

        Ok(next.and_then(DateTime::from_timestamp_micros))
    }

    /// Moves an item from `from` to `to` if it is still in `from`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if the item does not exist.
    /// Returns [`QueueError::InvalidTransition`] if the item is not in `from`.
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        id: &str,
        from: QueueStatus,
        to: QueueStatus,
        operation: &'static str,
    ) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = ?1,
                  stop_request = CASE WHEN ?1 = 'downloading' THEN stop_request ELSE NULL END,
                  updated_at = MAX(?2, updated_at + 1)
              WHERE id = ?3 AND status = ?4
              RETURNING *",
        )
        .bind(to.as_str())
        .bind(now_micros())
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, operation, item).await
    }

    /// Returns a paused item to the back of the pending queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is paused.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: &str) -> Result<QueueItem> {
        let now = now_micros();
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = 'pending',
                  queued_at = ?1,
                  not_before = NULL,
                  updated_at = MAX(?1, updated_at + 1)
              WHERE id = ?2 AND status = 'paused'
              RETURNING *",
        )
        .bind(now)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, "resume", item).await
    }

    /// Starts a new run for a completed or failed item.
    ///
    /// `retry_count` restarts at zero and the error, completion time and
    /// failed-child set are cleared. A failed item keeps its completed
    /// children so they are not fetched again; a completed item starts over.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is completed or failed.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn reset_for_retry(&self, id: &str) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = 'pending',
                  retry_count = 0,
                  error_message = NULL,
                  completed_at = NULL,
                  not_before = NULL,
                  failed_children = '[]',
                  completed_children = CASE WHEN status = 'completed' THEN '[]' ELSE completed_children END,
                  completed_tracks = CASE WHEN status = 'completed' THEN 0 ELSE completed_tracks END,
                  bytes_downloaded = CASE WHEN status = 'completed' THEN 0 ELSE bytes_downloaded END,
                  progress = CASE
                      WHEN status = 'completed' OR kind = 'track' THEN 0
                      ELSE progress
                  END,
                  queued_at = ?1,
                  updated_at = MAX(?1, updated_at + 1)
              WHERE id = ?2 AND status IN ('completed', 'failed')
              RETURNING *",
        )
        .bind(now_micros())
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, "retry", item).await
    }

    /// Cancels an item no worker holds (pending or paused).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is pending or paused.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn cancel_waiting(&self, id: &str) -> Result<QueueItem> {
        let now = now_micros();
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = 'failed',
                  error_message = ?1,
                  not_before = NULL,
                  completed_at = COALESCE(completed_at, ?2),
                  updated_at = MAX(?2, updated_at + 1)
              WHERE id = ?3 AND status IN ('pending', 'paused')
              RETURNING *",
        )
        .bind(CANCELLED_BY_USER)
        .bind(now)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, "cancel", item).await
    }

    /// Asks the worker holding a downloading item to stop at its next unit
    /// boundary.
    ///
    /// The request is stored on the row, so it reaches the worker even when
    /// the caller runs in another process. A stored cancel is never
    /// downgraded to a pause.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is downloading.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn request_stop(&self, id: &str, request: StopRequest) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET stop_request = CASE WHEN stop_request = 'cancel' THEN 'cancel' ELSE ?1 END,
                  updated_at = MAX(?2, updated_at + 1)
              WHERE id = ?3 AND status = 'downloading'
              RETURNING *",
        )
        .bind(request.as_str())
        .bind(now_micros())
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        let operation = match request {
            StopRequest::Pause => "pause",
            StopRequest::Cancel => "cancel",
        };
        self.accept_or_reject(id, operation, item).await
    }

    /// Persists a failure message on an item held by a worker.
    ///
    /// Runs before any status change so the cause survives a crash between
    /// the two writes.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is downloading.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self, message))]
    pub async fn record_failure(&self, id: &str, message: &str) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET error_message = ?1, updated_at = MAX(?2, updated_at + 1)
              WHERE id = ?3 AND status = 'downloading'
              RETURNING *",
        )
        .bind(message)
        .bind(now_micros())
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, "record failure for", item).await
    }

    /// Sends a failed downloading item back to the end of the pending queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is downloading.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn requeue_after_failure(
        &self,
        id: &str,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = 'pending',
                  retry_count = ?1,
                  error_message = NULL,
                  stop_request = NULL,
                  queued_at = ?2,
                  not_before = ?3,
                  updated_at = MAX(?2, updated_at + 1)
              WHERE id = ?4 AND status = 'downloading'
              RETURNING *",
        )
        .bind(i64::from(retry_count))
        .bind(now_micros())
        .bind(not_before.map(|t| t.timestamp_micros()))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, "requeue", item).await
    }

    /// Settles items left downloading by a previous process.
    ///
    /// Items with a stored pause become paused and items with a stored cancel
    /// fail as cancelled by the user; everything else returns to pending.
    /// Child sets are kept, so finished children are not fetched again.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn reset_downloading(&self) -> Result<u64> {
        let result = sqlx::query(
            r"UPDATE queue
              SET status = CASE stop_request
                      WHEN 'pause' THEN 'paused'
                      WHEN 'cancel' THEN 'failed'
                      ELSE 'pending'
                  END,
                  error_message = CASE WHEN stop_request = 'cancel' THEN ?2 ELSE error_message END,
                  completed_at = CASE
                      WHEN stop_request = 'cancel' THEN COALESCE(completed_at, ?1)
                      ELSE completed_at
                  END,
                  stop_request = NULL,
                  updated_at = MAX(?1, updated_at + 1)
              WHERE status = 'downloading'",
        )
        .bind(now_micros())
        .bind(CANCELLED_BY_USER)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Settles one downloading item that no worker holds any more, the same
    /// way [`Queue::reset_downloading`] settles them at start-up.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] unless the item is downloading.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn release(&self, id: &str) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(
            r"UPDATE queue
              SET status = CASE stop_request
                      WHEN 'pause' THEN 'paused'
                      WHEN 'cancel' THEN 'failed'
                      ELSE 'pending'
                  END,
                  error_message = CASE WHEN stop_request = 'cancel' THEN ?2 ELSE error_message END,
                  completed_at = CASE
                      WHEN stop_request = 'cancel' THEN COALESCE(completed_at, ?1)
                      ELSE completed_at
                  END,
                  stop_request = NULL,
                  updated_at = MAX(?1, updated_at + 1)
              WHERE id = ?3 AND status = 'downloading'
              RETURNING *",
        )
        .bind(now_micros())
        .bind(CANCELLED_BY_USER)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        self.accept_or_reject(id, "release", item).await
    }

    /// Removes an item no worker holds.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidTransition`] if the item is downloading.
    /// Returns [`QueueError::ItemNotFound`] or [`QueueError::Database`] otherwise.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<()> {
        let result = sqlx::query(r"DELETE FROM queue WHERE id = ? AND status != 'downloading'")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejection(id, "remove").await);
        }
        Ok(())
    }

    /// Clears all items with a specific status.
    ///
    /// Downloading items are never cleared; asking for them removes nothing.
    ///
    /// # Returns
    ///
    /// The number of items removed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear_by_status(&self, status: QueueStatus) -> Result<u64> {
        let result =
            sqlx::query(r"DELETE FROM queue WHERE status = ? AND status != 'downloading'")
                .bind(status.as_str())
                .execute(self.db.pool())
                .await?;

        Ok(result.rows_affected())
    }

    async fn accept_or_reject(
        &self,
        id: &str,
        operation: &'static str,
        item: Option<QueueItem>,
    ) -> Result<QueueItem> {
        match item {
            Some(item) => Ok(item),
            None => Err(self.rejection(id, operation).await),
        }
    }

    /// Explains why a conditional write matched no row.
    async fn rejection(&self, id: &str, operation: &'static str) -> QueueError {
        match self.get(id).await {
            Ok(Some(current)) => QueueError::invalid_transition(id, current.status, operation),
            Ok(None) => QueueError::ItemNotFound(id.to_string()),
            Err(err) => err,
        }
    }
}

fn now_micros() -> i64 {
    now_utc().timestamp_micros()
}

fn to_sql_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
