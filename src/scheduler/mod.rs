//! Scheduler and worker pool.
//!
//! The [`Scheduler`] owns the dispatch loop: it takes a worker slot from a
//! semaphore sized to [`EngineConfig::concurrency`], claims the oldest
//! claimable pending item with an atomic compare-and-set, and runs it on its
//! own Tokio task. At most `concurrency` items are ever `downloading`, and
//! each is held by exactly one worker.
//!
//! ```text
//! pending ──claim──▶ downloading ──success──▶ completed
//! pending ◀─requeue── downloading ──fail(retryable)
//!                     downloading ──fail(terminal)──▶ failed
//! downloading ──pause──▶ paused ──resume──▶ pending
//! downloading ──cancel──▶ failed ("cancelled by user")
//! completed/failed ──retry──▶ pending
//! ```
//!
//! Pause, cancel and shutdown are cooperative: a running worker sees the
//! request at its next unit boundary (before resolution, between child
//! tracks, after the last unit). Pause and cancel are stored on the item's
//! row, so they also reach a worker running in another process that shares
//! the store. Every persisted mutation is published through the
//! [`NotificationBridge`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mediafetch_core::pipeline::{
//!     HttpStreamFetcher, ManifestCatalog, MediaPipeline, SidecarTagger, XChaChaDecryptor,
//! };
//! use mediafetch_core::queue::{EnqueueHints, ItemKind, Queue};
//! use mediafetch_core::{Database, EngineConfig, NotificationBridge, Scheduler};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("queue.db")).await?;
//! let pipeline = MediaPipeline::new(
//!     Arc::new(ManifestCatalog::load(Path::new("catalog.json"))?),
//!     Arc::new(HttpStreamFetcher::new(Arc::new(XChaChaDecryptor::new()))?),
//!     Arc::new(SidecarTagger::new()),
//! );
//! let scheduler = Scheduler::new(
//!     EngineConfig::new("./music").with_concurrency(4),
//!     Queue::new(db),
//!     pipeline,
//!     Arc::new(NotificationBridge::new()),
//! )?;
//!
//! scheduler.enqueue("alb-1", ItemKind::Album, EnqueueHints::default()).await?;
//! let summary = scheduler.run_until_idle().await?;
//! println!("completed {}", summary.completed);
//! # Ok(())
//! # }
//! ```

mod control;
mod error_mapping;
mod persistence;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::notify::{ItemListener, NotificationBridge, SubscriptionId};
use crate::pipeline::MediaPipeline;
use crate::queue::{
    EnqueueHints, HistoryQuery, HistoryRecord, ItemKind, Queue, QueueError, QueueItem,
    QueueRepository, QueueStats, QueueStatus, StopRequest, now_utc,
};
use crate::retry::RetryPolicy;

use control::{ControlRegistry, ItemControl, StopSignal};

/// How long shutdown waits for running workers before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Attempts to settle a row whose worker is gone before leaving it to
/// start-up recovery.
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: Duration = Duration::from_millis(50);

/// Rounds `cancel` makes while the item flips between waiting and held.
const CANCEL_ATTEMPTS: u32 = 3;

/// Error type for scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Queue operation failed or was rejected.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Enqueue was called with a blank id.
    #[error("item id must not be empty")]
    EmptyId,

    /// `start` or `run_until_idle` while a dispatch loop is already active.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// The dispatch loop task panicked.
    #[error("dispatch loop panicked: {0}")]
    DispatcherPanicked(String),
}

impl EngineError {
    /// Returns true when the target item does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Queue(QueueError::ItemNotFound(_)))
    }

    /// Returns true when enqueue hit an existing id.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Queue(QueueError::DuplicateId(_)))
    }

    /// Returns true when the item's status forbids the operation.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::Queue(QueueError::InvalidTransition { .. }))
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerOutcome {
    Completed { partial: bool },
    Failed,
    Requeued,
    Paused,
    Cancelled,
    Interrupted,
    /// The final write failed and the row may still read downloading.
    Stranded,
}

/// Counts from one dispatch-loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items that reached `completed`, partial successes included.
    pub completed: usize,
    /// Of `completed`, items with some children missing.
    pub partial: usize,
    /// Items that failed terminally (cancellations excluded).
    pub failed: usize,
    /// Automatic requeues after retryable failures.
    pub requeued: usize,
    /// Items paused at a unit boundary.
    pub paused: usize,
    /// Items cancelled while downloading.
    pub cancelled: usize,
    /// Items returned to the queue by shutdown, or because their final
    /// write failed.
    pub interrupted: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Completed { partial } => {
                self.completed += 1;
                if partial {
                    self.partial += 1;
                }
            }
            WorkerOutcome::Failed => self.failed += 1,
            WorkerOutcome::Requeued => self.requeued += 1,
            WorkerOutcome::Paused => self.paused += 1,
            WorkerOutcome::Cancelled => self.cancelled += 1,
            WorkerOutcome::Interrupted | WorkerOutcome::Stranded => self.interrupted += 1,
        }
    }
}

/// State shared by the scheduler handle, the dispatch loop and workers.
pub(crate) struct Inner {
    config: EngineConfig,
    repo: Arc<dyn QueueRepository>,
    pipeline: MediaPipeline,
    bridge: Arc<NotificationBridge>,
    retry_policy: RetryPolicy,
    controls: ControlRegistry,
    wake: Notify,
    shutdown: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<Result<RunSummary, EngineError>>>>,
}

impl Inner {
    fn publish(&self, item: &QueueItem) {
        self.bridge.publish(item);
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn wait_for_wake(&self, timeout: Duration) {
        tokio::select! {
            () = self.wake.notified() => {}
            () = tokio::time::sleep(timeout) => {}
        }
    }
}

/// Download scheduler. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("concurrency", &self.inner.config.concurrency)
            .field("active", &self.inner.controls.active_count())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler over a queue store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` does not validate.
    pub fn new(
        config: EngineConfig,
        queue: Queue,
        pipeline: MediaPipeline,
        bridge: Arc<NotificationBridge>,
    ) -> Result<Self, EngineError> {
        Self::with_repository(config, Arc::new(queue), pipeline, bridge)
    }

    /// Creates a scheduler over any [`QueueRepository`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` does not validate.
    #[instrument(level = "debug", skip_all, fields(concurrency = config.concurrency))]
    pub fn with_repository(
        config: EngineConfig,
        repo: Arc<dyn QueueRepository>,
        pipeline: MediaPipeline,
        bridge: Arc<NotificationBridge>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        debug!(
            max_retries = config.max_retries,
            quality = %config.quality,
            download_dir = %config.download_dir.display(),
            "creating scheduler"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                retry_policy: config.retry_policy(),
                config,
                repo,
                pipeline,
                bridge,
                controls: ControlRegistry::default(),
                wake: Notify::new(),
                shutdown: AtomicBool::new(false),
                dispatcher: Mutex::new(None),
            }),
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Adds a pending item and wakes the dispatch loop.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyId`], or a queue error (`DuplicateId` when the id
    /// is already queued).
    #[instrument(skip(self, hints))]
    pub async fn enqueue(
        &self,
        id: &str,
        kind: ItemKind,
        hints: EnqueueHints,
    ) -> Result<QueueItem, EngineError> {
        if id.trim().is_empty() {
            return Err(EngineError::EmptyId);
        }
        let item = self
            .inner
            .repo
            .add(&QueueItem::new(id.trim(), kind, hints))
            .await?;
        info!(item_id = %item.id, kind = %item.kind, "item enqueued");
        self.inner.publish(&item);
        self.inner.wake.notify_one();
        Ok(item)
    }

    /// Asks the worker holding `id` to pause at its next unit boundary.
    ///
    /// The request is stored on the row, so it works whether the worker runs
    /// in this scheduler or in another process sharing the store. Returns the
    /// item as it was when the request was accepted.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the item is downloading; `ItemNotFound`.
    #[instrument(skip(self))]
    pub async fn pause(&self, id: &str) -> Result<QueueItem, EngineError> {
        let item = self.inner.repo.request_stop(id, StopRequest::Pause).await?;
        self.inner.controls.request(id, StopSignal::Pause);
        info!(item_id = %id, "pause requested");
        self.inner.publish(&item);
        Ok(item)
    }

    /// Returns a paused item to the back of the queue.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the item is paused; `ItemNotFound`.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: &str) -> Result<QueueItem, EngineError> {
        let item = self.inner.repo.resume(id).await?;
        info!(item_id = %id, "item resumed");
        self.inner.publish(&item);
        self.inner.wake.notify_one();
        Ok(item)
    }

    /// Starts a new run for a completed or failed item.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the item is completed or failed; `ItemNotFound`.
    #[instrument(skip(self))]
    pub async fn retry(&self, id: &str) -> Result<QueueItem, EngineError> {
        let item = self.inner.repo.reset_for_retry(id).await?;
        info!(item_id = %id, "item queued for retry");
        self.inner.publish(&item);
        self.inner.wake.notify_one();
        Ok(item)
    }

    /// Cancels an item.
    ///
    /// Pending and paused items fail immediately; a downloading item fails
    /// once its worker reaches the next unit boundary. Like [`Scheduler::pause`],
    /// the request on a downloading item is stored on the row.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for completed or failed items; `ItemNotFound`.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) -> Result<QueueItem, EngineError> {
        // The item may move between waiting and downloading while we look.
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.inner.repo.cancel_waiting(id).await {
                Ok(item) => {
                    info!(item_id = %id, "item cancelled");
                    self.inner.publish(&item);
                    return Ok(item);
                }
                Err(QueueError::InvalidTransition {
                    status: QueueStatus::Downloading,
                    ..
                }) => {}
                Err(error) => return Err(error.into()),
            }

            match self.inner.repo.request_stop(id, StopRequest::Cancel).await {
                Ok(item) => {
                    self.inner.controls.request(id, StopSignal::Cancel);
                    info!(item_id = %id, "cancel requested");
                    self.inner.publish(&item);
                    return Ok(item);
                }
                Err(QueueError::InvalidTransition {
                    status: QueueStatus::Pending | QueueStatus::Paused,
                    ..
                }) if attempts < CANCEL_ATTEMPTS => {}
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Deletes an item no worker holds.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` while downloading; `ItemNotFound`.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.inner.repo.remove(id).await?;
        info!(item_id = %id, "item removed");
        Ok(())
    }

    /// Deletes every item in `status`. Downloading items are never cleared.
    ///
    /// # Errors
    ///
    /// Returns queue database errors.
    #[instrument(skip(self))]
    pub async fn clear(&self, status: QueueStatus) -> Result<u64, EngineError> {
        let removed = self.inner.repo.clear_by_status(status).await?;
        info!(status = %status, removed, "cleared items");
        Ok(removed)
    }

    /// Lists items by creation order, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns queue database errors.
    pub async fn list(
        &self,
        offset: usize,
        limit: usize,
        status: Option<QueueStatus>,
    ) -> Result<Vec<QueueItem>, EngineError> {
        Ok(self.inner.repo.list(status, offset, limit).await?)
    }

    /// Per-status counts.
    ///
    /// # Errors
    ///
    /// Returns queue database errors.
    pub async fn stats(&self) -> Result<QueueStats, EngineError> {
        Ok(self.inner.repo.stats().await?)
    }

    /// Reads one item.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` if absent.
    pub async fn get(&self, id: &str) -> Result<QueueItem, EngineError> {
        self.inner
            .repo
            .get(id)
            .await?
            .ok_or_else(|| QueueError::ItemNotFound(id.to_string()).into())
    }

    /// Reads download history, newest first.
    ///
    /// # Errors
    ///
    /// Returns queue database errors.
    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, EngineError> {
        Ok(self.inner.repo.query_history(query).await?)
    }

    /// Registers a listener for item snapshots.
    pub fn subscribe(&self, listener: impl ItemListener) -> SubscriptionId {
        self.inner.bridge.subscribe(listener)
    }

    /// Recovers interrupted items and starts the dispatch loop in the background.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyRunning`], or queue errors from recovery.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut slot = self.inner.dispatcher.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(EngineError::AlreadyRunning);
        }

        self.inner.shutdown.store(false, Ordering::SeqCst);
        self.recover().await?;
        *slot = Some(tokio::spawn(dispatch(Arc::clone(&self.inner), false)));
        info!(concurrency = self.inner.config.concurrency, "scheduler started");
        Ok(())
    }

    /// Stops claiming, interrupts running workers and waits for them.
    ///
    /// Interrupted items return to pending. Returns the background loop's
    /// summary, or an empty one if `start` was never called.
    ///
    /// # Errors
    ///
    /// Propagates the dispatch loop's error, or [`EngineError::DispatcherPanicked`].
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<RunSummary, EngineError> {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.controls.interrupt_all();
        self.inner.wake.notify_one();

        let handle = self.inner.dispatcher.lock().await.take();
        let summary = match handle {
            Some(handle) => handle
                .await
                .map_err(|e| EngineError::DispatcherPanicked(e.to_string()))??,
            None => RunSummary::default(),
        };

        self.inner.bridge.flush().await;
        info!(?summary, "scheduler stopped");
        Ok(summary)
    }

    /// Runs the dispatch loop in the caller's task until nothing is left to do.
    ///
    /// Idle means: no item is claimable, no worker is running, and no pending
    /// item is waiting out a retry backoff. Paused items do not keep the loop
    /// alive. All snapshots are delivered to listeners before this returns.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyRunning`] while `start` is active, or queue
    /// errors from recovery.
    #[instrument(skip(self))]
    pub async fn run_until_idle(&self) -> Result<RunSummary, EngineError> {
        let slot = self.inner.dispatcher.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(EngineError::AlreadyRunning);
        }

        self.inner.shutdown.store(false, Ordering::SeqCst);
        self.recover().await?;
        let summary = dispatch(Arc::clone(&self.inner), true).await?;
        drop(slot);

        self.inner.bridge.flush().await;
        Ok(summary)
    }

    /// Settles items a previous process left downloading.
    async fn recover(&self) -> Result<(), EngineError> {
        let reset = self.inner.repo.reset_downloading().await?;
        if reset > 0 {
            info!(count = reset, "recovered interrupted downloads");
        }
        Ok(())
    }
}

/// A spawned worker and the slot it occupies.
struct RunningTask {
    id: String,
    control: Arc<ItemControl>,
    handle: JoinHandle<WorkerOutcome>,
    _permit: OwnedSemaphorePermit,
}

/// The dispatch loop.
///
/// A slot is taken before an item is claimed, and only given back after the
/// finished task has been reaped, so the number of downloading rows never
/// exceeds the pool size.
async fn dispatch(inner: Arc<Inner>, stop_when_idle: bool) -> Result<RunSummary, EngineError> {
    let semaphore = Arc::new(Semaphore::new(inner.config.concurrency));
    let idle_poll = inner.config.idle_poll;
    let mut tasks: Vec<RunningTask> = Vec::new();
    let mut summary = RunSummary::default();

    info!(
        concurrency = inner.config.concurrency,
        stop_when_idle, "dispatch loop started"
    );

    loop {
        drain_finished(&inner, &mut tasks, &mut summary).await;
        if inner.is_shutting_down() {
            break;
        }

        let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
            inner.wait_for_wake(idle_poll).await;
            continue;
        };

        match inner.repo.claim_next().await {
            Ok(Some(item)) => {
                debug!(item_id = %item.id, kind = %item.kind, "dispatching item");
                let control = inner.controls.register(&item.id);
                inner.publish(&item);

                let id = item.id.clone();
                let worker_inner = Arc::clone(&inner);
                let worker_control = Arc::clone(&control);
                let handle = tokio::spawn(async move {
                    let outcome = worker::run(&worker_inner, item, &worker_control).await;
                    worker_inner.wake.notify_one();
                    outcome
                });
                tasks.push(RunningTask {
                    id,
                    control,
                    handle,
                    _permit: permit,
                });
            }
            Ok(None) => {
                drop(permit);
                let next_deadline = match inner.repo.next_not_before().await {
                    Ok(deadline) => deadline,
                    Err(error) => {
                        warn!(error = %error, "failed to read next retry deadline");
                        None
                    }
                };
                if stop_when_idle && tasks.is_empty() && next_deadline.is_none() {
                    break;
                }
                let wait = next_deadline.map_or(idle_poll, |deadline| {
                    (deadline - now_utc())
                        .to_std()
                        .unwrap_or(Duration::ZERO)
                        .min(idle_poll)
                });
                inner.wait_for_wake(wait).await;
            }
            Err(error) => {
                drop(permit);
                warn!(error = %error, "failed to claim next item");
                if stop_when_idle && tasks.is_empty() && !error.is_busy_or_locked() {
                    return Err(error.into());
                }
                inner.wait_for_wake(idle_poll).await;
            }
        }
    }

    inner.controls.interrupt_all();
    debug!(task_count = tasks.len(), "waiting for workers to stop");
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    for mut task in tasks {
        match tokio::time::timeout_at(deadline, &mut task.handle).await {
            Ok(result) => finish_task(&inner, task, result, &mut summary).await,
            Err(_) => {
                task.handle.abort();
                release_stranded(&inner, &task.id).await;
                inner.controls.release(&task.id, &task.control);
                summary.record(WorkerOutcome::Interrupted);
            }
        }
    }

    info!(
        completed = summary.completed,
        partial = summary.partial,
        failed = summary.failed,
        requeued = summary.requeued,
        "dispatch loop finished"
    );
    Ok(summary)
}

async fn drain_finished(inner: &Inner, tasks: &mut Vec<RunningTask>, summary: &mut RunSummary) {
    let mut index = 0;
    while index < tasks.len() {
        if tasks[index].handle.is_finished() {
            let mut task = tasks.swap_remove(index);
            let result = (&mut task.handle).await;
            finish_task(inner, task, result, summary).await;
        } else {
            index += 1;
        }
    }
}

async fn finish_task(
    inner: &Inner,
    task: RunningTask,
    result: Result<WorkerOutcome, JoinError>,
    summary: &mut RunSummary,
) {
    match result {
        Ok(WorkerOutcome::Stranded) => {
            release_stranded(inner, &task.id).await;
            summary.record(WorkerOutcome::Stranded);
        }
        Ok(outcome) => summary.record(outcome),
        Err(join_error) => {
            if handle_task_join_error(inner, &task.id, &join_error).await {
                summary.record(WorkerOutcome::Failed);
            } else {
                release_stranded(inner, &task.id).await;
                summary.record(WorkerOutcome::Stranded);
            }
        }
    }
    inner.controls.release(&task.id, &task.control);
}

/// Marks a panicked worker's item failed. Returns false if the row could
/// not be written.
async fn handle_task_join_error(inner: &Inner, item_id: &str, join_error: &JoinError) -> bool {
    warn!(item_id = %item_id, error = %join_error, "worker task panicked");
    let message = format!("worker panicked: {join_error}");
    let mut item = match inner.repo.record_failure(item_id, &message).await {
        Ok(item) => item,
        Err(queue_error) => {
            warn!(item_id = %item_id, error = %queue_error, "failed to record worker panic");
            return false;
        }
    };
    item.status = QueueStatus::Failed;
    item.completed_at = Some(now_utc());
    match inner.repo.update(&item).await {
        Ok(saved) => {
            inner.publish(&saved);
            true
        }
        Err(queue_error) => {
            warn!(item_id = %item_id, error = %queue_error, "failed to mark panicked item as failed");
            false
        }
    }
}

/// Settles a row whose worker is gone, so no `downloading` row outlives the
/// slot that held it. A stored pause or cancel still applies; anything else
/// goes back to pending.
async fn release_stranded(inner: &Inner, item_id: &str) {
    for attempt in 1..=RELEASE_ATTEMPTS {
        match inner.repo.release(item_id).await {
            Ok(item) => {
                info!(item_id = %item_id, status = %item.status, "released item without a worker");
                inner.publish(&item);
                return;
            }
            Err(QueueError::InvalidTransition { .. } | QueueError::ItemNotFound(_)) => return,
            Err(queue_error) if attempt < RELEASE_ATTEMPTS => {
                warn!(
                    item_id = %item_id,
                    attempt,
                    error = %queue_error,
                    "failed to release item; retrying"
                );
                tokio::time::sleep(RELEASE_BACKOFF * attempt).await;
            }
            Err(queue_error) => {
                error!(
                    item_id = %item_id,
                    error = %queue_error,
                    "item stays downloading until the next start"
                );
            }
        }
    }
}
