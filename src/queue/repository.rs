//! Repository seam for queue/history persistence operations.
//!
//! The scheduler and its workers depend on this trait rather than on
//! [`Queue`] directly, so decorators (fault injection in tests, for example)
//! can stand in for the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    HistoryQuery, HistoryRecord, NewHistoryRecord, Queue, QueueItem, QueueStats, QueueStatus,
    Result, StopRequest,
};

/// Data-access contract for queue and history operations.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Persists a new item.
    async fn add(&self, item: &QueueItem) -> Result<QueueItem>;

    /// Overwrites the mutable fields of an item.
    async fn update(&self, item: &QueueItem) -> Result<QueueItem>;

    /// Reads one item.
    async fn get(&self, id: &str) -> Result<Option<QueueItem>>;

    /// Lists items, optionally filtered by status.
    async fn list(
        &self,
        status: Option<QueueStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<QueueItem>>;

    /// Per-status counts.
    async fn stats(&self) -> Result<QueueStats>;

    /// Claims the next claimable pending item.
    async fn claim_next(&self) -> Result<Option<QueueItem>>;

    /// Earliest future backoff deadline among pending items.
    async fn next_not_before(&self) -> Result<Option<DateTime<Utc>>>;

    /// Moves a claimed item to another status.
    async fn transition(
        &self,
        id: &str,
        from: QueueStatus,
        to: QueueStatus,
        operation: &'static str,
    ) -> Result<QueueItem>;

    /// paused → pending.
    async fn resume(&self, id: &str) -> Result<QueueItem>;

    /// completed/failed → pending, new run.
    async fn reset_for_retry(&self, id: &str) -> Result<QueueItem>;

    /// pending/paused → failed.
    async fn cancel_waiting(&self, id: &str) -> Result<QueueItem>;

    /// Stores a pause or cancel for the worker holding a downloading item.
    async fn request_stop(&self, id: &str, request: StopRequest) -> Result<QueueItem>;

    /// Persists the failure message of a claimed item.
    async fn record_failure(&self, id: &str, message: &str) -> Result<QueueItem>;

    /// downloading → pending after a retryable failure.
    async fn requeue_after_failure(
        &self,
        id: &str,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<QueueItem>;

    /// Crash recovery: settles every item left downloading.
    async fn reset_downloading(&self) -> Result<u64>;

    /// Settles one downloading item whose worker is gone.
    async fn release(&self, id: &str) -> Result<QueueItem>;

    /// Deletes an item no worker holds.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Deletes every item in a status.
    async fn clear_by_status(&self, status: QueueStatus) -> Result<u64>;

    /// Appends a history row.
    async fn add_to_history(&self, record: &NewHistoryRecord<'_>) -> Result<i64>;

    /// Reads history rows, newest first.
    async fn query_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>>;
}

#[async_trait]
impl QueueRepository for Queue {
    async fn add(&self, item: &QueueItem) -> Result<QueueItem> {
        Queue::add(self, item).await
    }

    async fn update(&self, item: &QueueItem) -> Result<QueueItem> {
        Queue::update(self, item).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        Queue::get(self, id).await
    }

    async fn list(
        &self,
        status: Option<QueueStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<QueueItem>> {
        match status {
            Some(status) => Queue::get_by_status(self, status, offset, limit).await,
            None => Queue::get_all(self, offset, limit).await,
        }
    }

    async fn stats(&self) -> Result<QueueStats> {
        Queue::get_stats(self).await
    }

    async fn claim_next(&self) -> Result<Option<QueueItem>> {
        Queue::claim_next(self).await
    }

    async fn next_not_before(&self) -> Result<Option<DateTime<Utc>>> {
        Queue::next_not_before(self).await
    }

    async fn transition(
        &self,
        id: &str,
        from: QueueStatus,
        to: QueueStatus,
        operation: &'static str,
    ) -> Result<QueueItem> {
        Queue::transition(self, id, from, to, operation).await
    }

    async fn resume(&self, id: &str) -> Result<QueueItem> {
        Queue::resume(self, id).await
    }

    async fn reset_for_retry(&self, id: &str) -> Result<QueueItem> {
        Queue::reset_for_retry(self, id).await
    }

    async fn cancel_waiting(&self, id: &str) -> Result<QueueItem> {
        Queue::cancel_waiting(self, id).await
    }

    async fn request_stop(&self, id: &str, request: StopRequest) -> Result<QueueItem> {
        Queue::request_stop(self, id, request).await
    }

    async fn record_failure(&self, id: &str, message: &str) -> Result<QueueItem> {
        Queue::record_failure(self, id, message).await
    }

    async fn requeue_after_failure(
        &self,
        id: &str,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<QueueItem> {
        Queue::requeue_after_failure(self, id, retry_count, not_before).await
    }

    async fn reset_downloading(&self) -> Result<u64> {
        Queue::reset_downloading(self).await
    }

    async fn release(&self, id: &str) -> Result<QueueItem> {
        Queue::release(self, id).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        Queue::remove(self, id).await
    }

    async fn clear_by_status(&self, status: QueueStatus) -> Result<u64> {
        Queue::clear_by_status(self, status).await
    }

    async fn add_to_history(&self, record: &NewHistoryRecord<'_>) -> Result<i64> {
        Queue::add_to_history(self, record).await
    }

    async fn query_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        Queue::query_history(self, query).await
    }
}
