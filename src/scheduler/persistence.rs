use chrono::TimeDelta;
use tracing::{debug, error, info, warn};

use crate::pipeline::PipelineError;
use crate::queue::{CANCELLED_BY_USER, NewHistoryRecord, QueueItem, QueueStatus, now_utc};
use crate::retry::{RetryDecision, classify_error};

use super::control::StopSignal;
use super::error_mapping::build_actionable_error_message;
use super::{Inner, WorkerOutcome};

/// Writes the worker's copy back and publishes it. On success `item` becomes
/// the stored row; on failure the working copy is kept and the run goes on.
pub(super) async fn persist_snapshot(inner: &Inner, item: &mut QueueItem) -> bool {
    match inner.repo.update(item).await {
        Ok(saved) => {
            inner.publish(&saved);
            *item = saved;
            true
        }
        Err(queue_error) => {
            warn!(
                item_id = %item.id,
                error = %queue_error,
                "failed to persist item snapshot"
            );
            false
        }
    }
}

pub(super) async fn persist_success(inner: &Inner, mut item: QueueItem) -> WorkerOutcome {
    item.status = QueueStatus::Completed;
    item.progress = 100;
    item.error_message = None;
    item.not_before = None;
    item.completed_at = Some(now_utc());

    if !persist_snapshot(inner, &mut item).await {
        error!(item_id = %item.id, "completed item could not be stored");
        return WorkerOutcome::Stranded;
    }

    let partial = item.is_partial_success();
    info!(
        item_id = %item.id,
        completed_tracks = item.completed_tracks,
        total_tracks = item.total_tracks,
        bytes = item.bytes_downloaded,
        partial,
        "item completed"
    );

    let file_path = item.output_path.as_deref().unwrap_or_default();
    let record = NewHistoryRecord {
        track_id: &item.id,
        title: &item.title,
        artist: &item.artist,
        album: &item.album,
        file_path,
        file_size_bytes: item.bytes_downloaded,
        quality: inner.config.quality.as_str(),
    };
    if let Err(queue_error) = inner.repo.add_to_history(&record).await {
        warn!(
            item_id = %item.id,
            error = %queue_error,
            "failed to append download history row"
        );
    }

    WorkerOutcome::Completed { partial }
}

pub(super) async fn persist_failure(
    inner: &Inner,
    mut item: QueueItem,
    failure: &PipelineError,
) -> WorkerOutcome {
    let failure_type = classify_error(failure);
    let error_message = build_actionable_error_message(failure);

    warn!(
        item_id = %item.id,
        error = %failure,
        failure_type = ?failure_type,
        retry_count = item.retry_count,
        "item run failed"
    );

    // The message lands before any status change.
    item.error_message = Some(error_message);
    persist_snapshot(inner, &mut item).await;

    match inner
        .retry_policy
        .should_retry(failure_type, item.retry_count)
    {
        RetryDecision::Retry { delay, retry_count } => {
            let not_before = (!delay.is_zero())
                .then(|| now_utc() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero()));
            match inner
                .repo
                .requeue_after_failure(&item.id, retry_count, not_before)
                .await
            {
                Ok(requeued) => {
                    info!(
                        item_id = %requeued.id,
                        retry_count,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "item requeued for retry"
                    );
                    inner.publish(&requeued);
                    WorkerOutcome::Requeued
                }
                Err(queue_error) => {
                    warn!(
                        item_id = %item.id,
                        error = %queue_error,
                        "failed to requeue item"
                    );
                    WorkerOutcome::Stranded
                }
            }
        }
        RetryDecision::DoNotRetry { reason } => {
            debug!(item_id = %item.id, reason = %reason, "not retrying");
            item.status = QueueStatus::Failed;
            item.completed_at = Some(now_utc());
            if persist_snapshot(inner, &mut item).await {
                WorkerOutcome::Failed
            } else {
                WorkerOutcome::Stranded
            }
        }
    }
}

pub(super) async fn persist_stop(
    inner: &Inner,
    mut item: QueueItem,
    signal: StopSignal,
) -> WorkerOutcome {
    let outcome = match signal {
        StopSignal::Pause => {
            item.status = QueueStatus::Paused;
            WorkerOutcome::Paused
        }
        StopSignal::Cancel => {
            item.status = QueueStatus::Failed;
            item.error_message = Some(CANCELLED_BY_USER.to_string());
            item.completed_at = Some(now_utc());
            WorkerOutcome::Cancelled
        }
        StopSignal::Interrupt => {
            item.status = QueueStatus::Pending;
            WorkerOutcome::Interrupted
        }
    };

    info!(
        item_id = %item.id,
        status = %item.status,
        completed_tracks = item.completed_tracks,
        "item stopped at unit boundary"
    );
    if persist_snapshot(inner, &mut item).await {
        outcome
    } else {
        WorkerOutcome::Stranded
    }
}
