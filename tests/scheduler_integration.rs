//! Integration tests for the scheduler and worker pool.
//!
//! The catalog is an in-memory manifest; the fetcher and tagger are scripted
//! fakes so failures, panics and mid-run pauses happen exactly where a test
//! puts them. A store decorator injects write failures.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediafetch_core::pipeline::{
    FetchRequest, FetchedFile, ManifestCatalog, ManifestEntry, StreamLocator, TagMetadata, Tagger,
    StreamFetcher, TransferProgress,
};
use mediafetch_core::queue::{
    CANCELLED_BY_USER, HistoryRecord, NewHistoryRecord, QueueDbErrorKind, QueueStats,
};
use mediafetch_core::{
    Database, EngineConfig, EngineError, EnqueueHints, HistoryQuery, ItemKind, MediaPipeline,
    NotificationBridge, PipelineError, Queue, QueueError, QueueItem, QueueRepository,
    QueueStatus, Scheduler, StopRequest,
};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

// ==================== Scripted collaborators ====================

/// What one fetch attempt of a track does.
#[derive(Debug, Clone, Copy)]
enum Step {
    Ok(u64),
    Transient,
    NotFound,
    Panic,
}

/// Blocks a fetch until the test releases it.
struct Gate {
    entered: Notify,
    release: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("fetch never reached the gate");
    }

    fn open(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Default)]
struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn script(&self, track_id: &str, steps: &[Step]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(track_id.to_string(), steps.iter().copied().collect());
    }

    fn gate(&self, track_id: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.gates
            .lock()
            .unwrap()
            .insert(track_id.to_string(), Arc::clone(&gate));
        gate
    }

    fn calls_for(&self, track_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == track_id)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StreamFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &dyn TransferProgress,
    ) -> Result<FetchedFile, PipelineError> {
        self.calls.lock().unwrap().push(request.track_id.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        progress.on_transfer(50, Some(100)).await;
        let gate = self.gates.lock().unwrap().get(&request.track_id).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.track_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Ok(1_000));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Step::Ok(bytes) => {
                progress.on_transfer(bytes, Some(bytes)).await;
                Ok(FetchedFile {
                    path: request
                        .download_dir
                        .join(format!("{}.{}", request.track_id, request.quality.extension())),
                    bytes,
                })
            }
            Step::Transient => Err(PipelineError::transient("503 Service Unavailable")),
            Step::NotFound => Err(PipelineError::not_found(
                &request.track_id,
                "stream returned 404",
            )),
            Step::Panic => panic!("scripted fetcher panic for {}", request.track_id),
        }
    }
}

#[derive(Default)]
struct RecordingTagger {
    tagged: Mutex<Vec<TagMetadata>>,
    fail: bool,
}

#[async_trait]
impl Tagger for RecordingTagger {
    async fn embed(&self, _path: &Path, metadata: &TagMetadata) -> Result<(), PipelineError> {
        self.tagged.lock().unwrap().push(metadata.clone());
        if self.fail {
            return Err(PipelineError::invalid_path("tags", "read-only file"));
        }
        Ok(())
    }
}

/// Store decorator that fails chosen writes a fixed number of times, then
/// behaves like the wrapped queue.
struct FaultyRepository {
    queue: Queue,
    fail_update_to: Option<QueueStatus>,
    fail_requeue: bool,
    failures_left: AtomicUsize,
}

impl FaultyRepository {
    fn failing_update_to(queue: Queue, status: QueueStatus, times: usize) -> Self {
        Self {
            queue,
            fail_update_to: Some(status),
            fail_requeue: false,
            failures_left: AtomicUsize::new(times),
        }
    }

    fn failing_requeue(queue: Queue, times: usize) -> Self {
        Self {
            queue,
            fail_update_to: None,
            fail_requeue: true,
            failures_left: AtomicUsize::new(times),
        }
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn locked() -> QueueError {
        QueueError::Database {
            kind: QueueDbErrorKind::BusyOrLocked,
            message: "database is locked".into(),
        }
    }
}

#[async_trait]
impl QueueRepository for FaultyRepository {
    async fn add(&self, item: &QueueItem) -> Result<QueueItem, QueueError> {
        self.queue.add(item).await
    }

    async fn update(&self, item: &QueueItem) -> Result<QueueItem, QueueError> {
        if self.fail_update_to == Some(item.status) && self.take_failure() {
            return Err(Self::locked());
        }
        self.queue.update(item).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        self.queue.get(id).await
    }

    async fn list(
        &self,
        status: Option<QueueStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<QueueItem>, QueueError> {
        QueueRepository::list(&self.queue, status, offset, limit).await
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.queue.get_stats().await
    }

    async fn claim_next(&self) -> Result<Option<QueueItem>, QueueError> {
        self.queue.claim_next().await
    }

    async fn next_not_before(&self) -> Result<Option<DateTime<Utc>>, QueueError> {
        self.queue.next_not_before().await
    }

    async fn transition(
        &self,
        id: &str,
        from: QueueStatus,
        to: QueueStatus,
        operation: &'static str,
    ) -> Result<QueueItem, QueueError> {
        self.queue.transition(id, from, to, operation).await
    }

    async fn resume(&self, id: &str) -> Result<QueueItem, QueueError> {
        self.queue.resume(id).await
    }

    async fn reset_for_retry(&self, id: &str) -> Result<QueueItem, QueueError> {
        self.queue.reset_for_retry(id).await
    }

    async fn cancel_waiting(&self, id: &str) -> Result<QueueItem, QueueError> {
        self.queue.cancel_waiting(id).await
    }

    async fn request_stop(&self, id: &str, request: StopRequest) -> Result<QueueItem, QueueError> {
        self.queue.request_stop(id, request).await
    }

    async fn record_failure(&self, id: &str, message: &str) -> Result<QueueItem, QueueError> {
        self.queue.record_failure(id, message).await
    }

    async fn requeue_after_failure(
        &self,
        id: &str,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<QueueItem, QueueError> {
        if self.fail_requeue && self.take_failure() {
            return Err(Self::locked());
        }
        self.queue
            .requeue_after_failure(id, retry_count, not_before)
            .await
    }

    async fn reset_downloading(&self) -> Result<u64, QueueError> {
        self.queue.reset_downloading().await
    }

    async fn release(&self, id: &str) -> Result<QueueItem, QueueError> {
        self.queue.release(id).await
    }

    async fn remove(&self, id: &str) -> Result<(), QueueError> {
        self.queue.remove(id).await
    }

    async fn clear_by_status(&self, status: QueueStatus) -> Result<u64, QueueError> {
        self.queue.clear_by_status(status).await
    }

    async fn add_to_history(&self, record: &NewHistoryRecord<'_>) -> Result<i64, QueueError> {
        self.queue.add_to_history(record).await
    }

    async fn query_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, QueueError> {
        self.queue.query_history(query).await
    }
}

fn track_entry(id: &str, album: &str) -> ManifestEntry {
    ManifestEntry {
        kind: ItemKind::Track,
        title: format!("Title {id}"),
        artist: "Miles Davis".into(),
        album: album.into(),
        children: Vec::new(),
        stream: Some(StreamLocator {
            url: format!("https://cdn.example/{id}"),
            key: None,
            track_number: None,
        }),
        requires_auth: false,
    }
}

/// Manifest with `tracks` loose tracks and one album per `(id, child count)`.
fn manifest(tracks: &[&str], albums: &[(&str, usize)]) -> HashMap<String, ManifestEntry> {
    let mut entries = HashMap::new();
    for id in tracks {
        entries.insert((*id).to_string(), track_entry(id, ""));
    }
    for (album_id, count) in albums {
        let children: Vec<String> = (1..=*count).map(|n| format!("{album_id}-t{n}")).collect();
        for child in &children {
            entries.insert(child.clone(), track_entry(child, album_id));
        }
        entries.insert(
            (*album_id).to_string(),
            ManifestEntry {
                kind: ItemKind::Album,
                title: format!("Album {album_id}"),
                artist: "Miles Davis".into(),
                album: format!("Album {album_id}"),
                children,
                stream: None,
                requires_auth: false,
            },
        );
    }
    entries
}

struct Harness {
    scheduler: Scheduler,
    queue: Queue,
    bridge: Arc<NotificationBridge>,
    fetcher: Arc<ScriptedFetcher>,
    tagger: Arc<RecordingTagger>,
    temp_dir: TempDir,
}

async fn harness(
    entries: HashMap<String, ManifestEntry>,
    fetcher: ScriptedFetcher,
    tagger: RecordingTagger,
    configure: impl FnOnce(EngineConfig) -> EngineConfig,
) -> Harness {
    harness_with_store(entries, fetcher, tagger, configure, |queue| {
        Arc::new(queue) as Arc<dyn QueueRepository>
    })
    .await
}

/// Like [`harness`], but the scheduler talks to the store through `wrap`.
async fn harness_with_store(
    entries: HashMap<String, ManifestEntry>,
    fetcher: ScriptedFetcher,
    tagger: RecordingTagger,
    configure: impl FnOnce(EngineConfig) -> EngineConfig,
    wrap: impl FnOnce(Queue) -> Arc<dyn QueueRepository>,
) -> Harness {
    let temp_dir = TempDir::new().expect("temp dir");
    let db = Database::new(&temp_dir.path().join("queue.db"))
        .await
        .expect("database");
    let queue = Queue::new(db);

    let mut config = EngineConfig::new(temp_dir.path().join("music"))
        .with_concurrency(2)
        .with_retries(3, Duration::ZERO);
    config.idle_poll = Duration::from_millis(20);
    let config = configure(config);

    let fetcher = Arc::new(fetcher);
    let tagger = Arc::new(tagger);
    let bridge = Arc::new(NotificationBridge::new());
    let pipeline = MediaPipeline::new(
        Arc::new(ManifestCatalog::from_entries(entries)),
        Arc::clone(&fetcher) as Arc<dyn StreamFetcher>,
        Arc::clone(&tagger) as Arc<dyn Tagger>,
    );
    let scheduler =
        Scheduler::with_repository(config, wrap(queue.clone()), pipeline, Arc::clone(&bridge))
            .expect("scheduler");

    Harness {
        scheduler,
        queue,
        bridge,
        fetcher,
        tagger,
        temp_dir,
    }
}

async fn enqueue(scheduler: &Scheduler, id: &str, kind: ItemKind) -> QueueItem {
    scheduler
        .enqueue(id, kind, EnqueueHints::default())
        .await
        .expect("enqueue")
}

async fn wait_for_status(scheduler: &Scheduler, id: &str, status: QueueStatus) -> QueueItem {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let item = scheduler.get(id).await.expect("get");
            if item.status == status {
                return item;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("status never reached")
}

// ==================== Pool ====================

#[tokio::test]
async fn test_pool_never_runs_more_than_concurrency_items() {
    let ids: Vec<String> = (0..1_000).map(|i| format!("trk-{i:04}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let h = harness(
        manifest(&id_refs, &[]),
        ScriptedFetcher::with_delay(Duration::from_millis(1)),
        RecordingTagger::default(),
        |config| config.with_concurrency(4),
    )
    .await;

    let downloading = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let downloading = Arc::clone(&downloading);
        let peak = Arc::clone(&peak);
        h.scheduler.subscribe(move |item: &QueueItem| {
            let mut set = downloading.lock().unwrap();
            if item.status == QueueStatus::Downloading {
                set.insert(item.id.clone());
            } else {
                set.remove(&item.id);
            }
            peak.fetch_max(set.len(), Ordering::SeqCst);
        });
    }

    for id in &ids {
        enqueue(&h.scheduler, id, ItemKind::Track).await;
    }
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.completed, 1_000);
    assert_eq!(summary.failed, 0);
    assert!(h.fetcher.max_in_flight.load(Ordering::SeqCst) <= 4);
    assert!(h.fetcher.max_in_flight.load(Ordering::SeqCst) > 1);
    assert!(peak.load(Ordering::SeqCst) <= 4);

    let stats = h.scheduler.stats().await.unwrap();
    assert_eq!(stats.completed, 1_000);
    assert_eq!(stats.downloading, 0);
    assert_eq!(h.fetcher.total_calls(), 1_000);
}

#[tokio::test]
async fn test_track_completes_with_history_and_tags() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let (_, mut rx) = h.bridge.subscribe_channel();

    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(summary.completed, 1);

    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert_eq!(item.progress, 100);
    assert_eq!(item.title, "Title trk-1");
    assert_eq!(item.bytes_downloaded, 1_000);
    assert!(item.completed_at.is_some());
    assert!(item.output_path.as_deref().unwrap().ends_with("trk-1.mp3"));

    let history = h.scheduler.history(&HistoryQuery::default()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].track_id, "trk-1");
    assert_eq!(history[0].quality, "mp3_320");
    assert_eq!(h.tagger.tagged.lock().unwrap().len(), 1);

    // run_until_idle flushes the bridge, so every snapshot is already queued.
    let mut snapshots = Vec::new();
    while let Ok(item) = rx.try_recv() {
        snapshots.push(item);
    }
    let statuses: Vec<_> = snapshots.iter().map(|item| item.status).collect();
    assert_eq!(statuses.first(), Some(&QueueStatus::Pending));
    assert_eq!(statuses.last(), Some(&QueueStatus::Completed));
    assert!(statuses.contains(&QueueStatus::Downloading));
    let progress: Vec<_> = snapshots
        .iter()
        .filter(|item| item.status == QueueStatus::Downloading)
        .map(|item| item.progress)
        .collect();
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
}

// ==================== Retry ====================

#[tokio::test]
async fn test_transient_then_success_counts_one_retry() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    h.fetcher.script("trk-1", &[Step::Transient, Step::Ok(500)]);

    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.requeued, 1);
    assert_eq!(summary.completed, 1);
    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert_eq!(item.retry_count, 1);
    assert!(item.error_message.is_none());
    assert_eq!(item.bytes_downloaded, 500);
}

#[tokio::test]
async fn test_transient_failures_stop_at_max_retries() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config.with_retries(3, Duration::ZERO),
    )
    .await;
    h.fetcher.script("trk-1", &[Step::Transient; 10]);

    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.requeued, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(h.fetcher.calls_for("trk-1"), 4);

    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.retry_count, 3);
    let message = item.error_message.unwrap();
    assert!(message.starts_with("transient failure"));
    assert!(message.contains("Suggestion:"));
    assert!(item.completed_at.is_some());
}

#[tokio::test]
async fn test_auth_failure_is_terminal() {
    let mut entries = manifest(&["trk-1"], &[]);
    entries.get_mut("trk-1").unwrap().requires_auth = true;
    let h = harness(
        entries,
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;

    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.requeued, 0);
    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.retry_count, 0);
    assert!(item.error_message.unwrap().starts_with("authentication failed"));
    assert_eq!(h.fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_explicit_retry_reruns_completed_item() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    h.fetcher.script("trk-1", &[Step::Transient]);

    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(h.scheduler.get("trk-1").await.unwrap().retry_count, 1);

    let retried = h.scheduler.retry("trk-1").await.unwrap();
    assert_eq!(retried.status, QueueStatus::Pending);
    assert_eq!(retried.retry_count, 0);
    assert!(retried.completed_at.is_none());

    h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(h.fetcher.calls_for("trk-1"), 3);
    assert_eq!(h.scheduler.history(&HistoryQuery::default()).await.unwrap().len(), 2);

    let err = h.scheduler.retry("ghost").await.unwrap_err();
    assert!(err.is_not_found());
}

// ==================== Composites ====================

#[tokio::test]
async fn test_album_with_missing_tracks_completes_partially() {
    let h = harness(
        manifest(&[], &[("alb", 10)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    for n in [3, 6, 9] {
        h.fetcher.script(&format!("alb-t{n}"), &[Step::NotFound]);
    }

    enqueue(&h.scheduler, "alb", ItemKind::Album).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.partial, 1);
    let item = h.scheduler.get("alb").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert!(item.is_partial_success());
    assert_eq!(item.total_tracks, 10);
    assert_eq!(item.completed_tracks, 7);
    assert_eq!(item.failed_children, vec!["alb-t3", "alb-t6", "alb-t9"]);
    assert_eq!(item.progress, 100);
    assert_eq!(item.bytes_downloaded, 7_000);
    assert_eq!(item.retry_count, 0);

    let tagged = h.tagger.tagged.lock().unwrap();
    assert_eq!(tagged.len(), 7);
    assert_eq!(tagged[0].track_number, Some(1));
    assert_eq!(tagged[0].album, "alb");
}

#[tokio::test]
async fn test_album_with_no_downloadable_tracks_fails() {
    let h = harness(
        manifest(&[], &[("alb", 3)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    for n in 1..=3 {
        h.fetcher.script(&format!("alb-t{n}"), &[Step::NotFound]);
    }

    enqueue(&h.scheduler, "alb", ItemKind::Album).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.failed, 1);
    let item = h.scheduler.get("alb").await.unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert!(item
        .error_message
        .unwrap()
        .contains("none of the 3 tracks could be downloaded"));
}

#[tokio::test]
async fn test_album_retry_skips_completed_children() {
    let h = harness(
        manifest(&[], &[("alb", 3)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    h.fetcher.script("alb-t2", &[Step::Transient]);

    enqueue(&h.scheduler, "alb", ItemKind::Album).await;
    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.requeued, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(h.fetcher.calls_for("alb-t1"), 1);
    assert_eq!(h.fetcher.calls_for("alb-t2"), 2);
    assert_eq!(h.fetcher.calls_for("alb-t3"), 1);

    let item = h.scheduler.get("alb").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert_eq!(item.retry_count, 1);
    assert_eq!(item.completed_tracks, 3);
    assert!(!item.is_partial_success());
}

#[tokio::test]
async fn test_tagging_failure_keeps_download() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger {
            fail: true,
            ..RecordingTagger::default()
        },
        |config| config,
    )
    .await;

    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    h.scheduler.run_until_idle().await.unwrap();

    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert!(item.error_message.is_none());
}

// ==================== Pause, cancel, shutdown ====================

#[tokio::test]
async fn test_pause_is_rejected_unless_downloading() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let err = h.scheduler.pause("trk-1").await.unwrap_err();
    assert!(err.is_invalid_transition());
    assert_eq!(
        h.scheduler.get("trk-1").await.unwrap().status,
        QueueStatus::Pending
    );
    assert!(h.scheduler.pause("ghost").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_pause_mid_album_keeps_completed_children() {
    let h = harness(
        manifest(&[], &[("alb", 3)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let gate = h.fetcher.gate("alb-t2");
    enqueue(&h.scheduler, "alb", ItemKind::Album).await;

    let runner = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.run_until_idle().await })
    };
    gate.wait_entered().await;
    let accepted = h.scheduler.pause("alb").await.unwrap();
    assert_eq!(accepted.status, QueueStatus::Downloading);
    gate.open();

    let summary = runner.await.unwrap().unwrap();
    assert_eq!(summary.paused, 1);
    let paused = h.scheduler.get("alb").await.unwrap();
    assert_eq!(paused.status, QueueStatus::Paused);
    assert_eq!(paused.completed_tracks, 2);
    assert_eq!(paused.completed_children, vec!["alb-t1", "alb-t2"]);
    assert_eq!(h.fetcher.calls_for("alb-t3"), 0);

    let resumed = h.scheduler.resume("alb").await.unwrap();
    assert_eq!(resumed.status, QueueStatus::Pending);
    h.scheduler.run_until_idle().await.unwrap();

    let done = h.scheduler.get("alb").await.unwrap();
    assert_eq!(done.status, QueueStatus::Completed);
    assert_eq!(done.completed_tracks, 3);
    assert_eq!(h.fetcher.calls_for("alb-t1"), 1);
    assert_eq!(h.fetcher.calls_for("alb-t2"), 1);
}

#[tokio::test]
async fn test_cancel_waiting_and_downloading_items() {
    let h = harness(
        manifest(&["trk-1"], &[("alb", 2)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config.with_concurrency(1),
    )
    .await;
    let gate = h.fetcher.gate("alb-t1");
    enqueue(&h.scheduler, "alb", ItemKind::Album).await;
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let cancelled = h.scheduler.cancel("trk-1").await.unwrap();
    assert_eq!(cancelled.status, QueueStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some(CANCELLED_BY_USER));

    let runner = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.run_until_idle().await })
    };
    gate.wait_entered().await;
    let requested = h.scheduler.cancel("alb").await.unwrap();
    assert_eq!(requested.status, QueueStatus::Downloading);
    gate.open();

    let summary = runner.await.unwrap().unwrap();
    assert_eq!(summary.cancelled, 1);
    let album = h.scheduler.get("alb").await.unwrap();
    assert_eq!(album.status, QueueStatus::Failed);
    assert_eq!(album.error_message.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(h.fetcher.calls_for("alb-t2"), 0);
    assert_eq!(h.fetcher.calls_for("trk-1"), 0);

    let err = h.scheduler.cancel("alb").await.unwrap_err();
    assert!(err.is_invalid_transition());
}

/// Runs the loop in the background, waits until `gate` holds a fetch, applies
/// `request`, opens the gate and returns the finished run's summary.
async fn stop_during_gated_fetch<F, Fut>(
    h: &Harness,
    gate: &Gate,
    request: F,
) -> mediafetch_core::RunSummary
where
    F: FnOnce(Scheduler) -> Fut,
    Fut: std::future::Future<Output = Result<QueueItem, EngineError>>,
{
    let runner = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.run_until_idle().await })
    };
    gate.wait_entered().await;
    let accepted = request(h.scheduler.clone()).await.unwrap();
    assert_eq!(accepted.status, QueueStatus::Downloading);
    gate.open();
    runner.await.unwrap().unwrap()
}

#[tokio::test]
async fn test_pause_during_only_track_fetch_pauses() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let gate = h.fetcher.gate("trk-1");
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let summary =
        stop_during_gated_fetch(&h, &gate, |s| async move { s.pause("trk-1").await }).await;

    assert_eq!(summary.paused, 1);
    assert_eq!(summary.completed, 0);
    let paused = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(paused.status, QueueStatus::Paused);
    assert_eq!(paused.stop_request, None);
    assert!(paused.completed_at.is_none());
    assert!(h.scheduler.history(&HistoryQuery::default()).await.unwrap().is_empty());

    h.scheduler.resume("trk-1").await.unwrap();
    h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(
        h.scheduler.get("trk-1").await.unwrap().status,
        QueueStatus::Completed
    );
    assert_eq!(h.fetcher.calls_for("trk-1"), 2);
}

#[tokio::test]
async fn test_cancel_during_only_track_fetch_cancels() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let gate = h.fetcher.gate("trk-1");
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let summary =
        stop_during_gated_fetch(&h, &gate, |s| async move { s.cancel("trk-1").await }).await;

    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.completed, 0);
    let cancelled = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(cancelled.status, QueueStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some(CANCELLED_BY_USER));
    assert!(cancelled.completed_at.is_some());
    assert!(h.scheduler.history(&HistoryQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pause_during_last_album_child_pauses() {
    let h = harness(
        manifest(&[], &[("alb", 3)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let gate = h.fetcher.gate("alb-t3");
    enqueue(&h.scheduler, "alb", ItemKind::Album).await;

    let summary =
        stop_during_gated_fetch(&h, &gate, |s| async move { s.pause("alb").await }).await;

    assert_eq!(summary.paused, 1);
    let paused = h.scheduler.get("alb").await.unwrap();
    assert_eq!(paused.status, QueueStatus::Paused);
    assert_eq!(paused.completed_tracks, 3);

    h.scheduler.resume("alb").await.unwrap();
    h.scheduler.run_until_idle().await.unwrap();
    let done = h.scheduler.get("alb").await.unwrap();
    assert_eq!(done.status, QueueStatus::Completed);
    for n in 1..=3 {
        assert_eq!(h.fetcher.calls_for(&format!("alb-t{n}")), 1);
    }
}

#[tokio::test]
async fn test_pause_wins_over_retryable_failure() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    h.fetcher.script("trk-1", &[Step::Transient]);
    let gate = h.fetcher.gate("trk-1");
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let summary =
        stop_during_gated_fetch(&h, &gate, |s| async move { s.pause("trk-1").await }).await;

    assert_eq!(summary.paused, 1);
    assert_eq!(summary.requeued, 0);
    let paused = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(paused.status, QueueStatus::Paused);
    assert_eq!(paused.retry_count, 0);
    assert_eq!(h.fetcher.calls_for("trk-1"), 1);
}

#[tokio::test]
async fn test_pause_from_another_process_reaches_worker() {
    let h = harness(
        manifest(&[], &[("alb", 3)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let gate = h.fetcher.gate("alb-t2");
    enqueue(&h.scheduler, "alb", ItemKind::Album).await;

    // A second scheduler over its own connection pool holds no worker state,
    // like a separate CLI invocation.
    let db = Database::new(&h.temp_dir.path().join("queue.db")).await.unwrap();
    let other = Scheduler::new(
        EngineConfig::new(h.temp_dir.path().join("music")),
        Queue::new(db),
        MediaPipeline::new(
            Arc::new(ManifestCatalog::default()),
            Arc::new(ScriptedFetcher::default()),
            Arc::new(RecordingTagger::default()),
        ),
        Arc::new(NotificationBridge::new()),
    )
    .unwrap();

    let summary = stop_during_gated_fetch(&h, &gate, |_| async move {
        let accepted = other.pause("alb").await;
        assert_eq!(
            other.get("alb").await.unwrap().stop_request,
            Some(StopRequest::Pause)
        );
        accepted
    })
    .await;

    assert_eq!(summary.paused, 1);
    let paused = h.scheduler.get("alb").await.unwrap();
    assert_eq!(paused.status, QueueStatus::Paused);
    assert_eq!(paused.completed_children, vec!["alb-t1", "alb-t2"]);
    assert_eq!(paused.stop_request, None);
    assert_eq!(h.fetcher.calls_for("alb-t3"), 0);
}

#[tokio::test]
async fn test_stop_requests_accepted_before_a_worker_holds_the_item() {
    let h = harness(
        manifest(&["trk-1", "trk-2"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    enqueue(&h.scheduler, "trk-2", ItemKind::Track).await;

    // Claimed rows with no registered worker, as right after claim_next.
    h.queue.claim_next().await.unwrap().unwrap();
    h.queue.claim_next().await.unwrap().unwrap();
    let paused = h.scheduler.pause("trk-1").await.unwrap();
    assert_eq!(paused.stop_request, Some(StopRequest::Pause));
    let cancelled = h.scheduler.cancel("trk-2").await.unwrap();
    assert_eq!(cancelled.status, QueueStatus::Downloading);
    assert_eq!(cancelled.stop_request, Some(StopRequest::Cancel));

    let summary = h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(
        h.scheduler.get("trk-1").await.unwrap().status,
        QueueStatus::Paused
    );
    let failed = h.scheduler.get("trk-2").await.unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(h.fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_shutdown_interrupts_running_items_back_to_pending() {
    let h = harness(
        manifest(&[], &[("alb", 3)]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    let gate = h.fetcher.gate("alb-t1");
    enqueue(&h.scheduler, "alb", ItemKind::Album).await;

    h.scheduler.start().await.unwrap();
    assert!(matches!(
        h.scheduler.start().await,
        Err(EngineError::AlreadyRunning)
    ));
    gate.wait_entered().await;

    // shutdown raises the interrupt before its first await point, so the
    // worker sees it once the gated fetch returns.
    let (summary, ()) = tokio::join!(h.scheduler.shutdown(), async { gate.open() });
    let summary = summary.unwrap();
    assert_eq!(summary.interrupted, 1);

    let item = h.scheduler.get("alb").await.unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.completed_children, vec!["alb-t1"]);

    h.scheduler.run_until_idle().await.unwrap();
    let item = h.scheduler.get("alb").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert_eq!(h.fetcher.calls_for("alb-t1"), 1);
}

#[tokio::test]
async fn test_start_picks_up_items_enqueued_later() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;

    h.scheduler.start().await.unwrap();
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    wait_for_status(&h.scheduler, "trk-1", QueueStatus::Completed).await;

    let summary = h.scheduler.shutdown().await.unwrap();
    assert_eq!(summary.completed, 1);
}

// ==================== Recovery and failures ====================

#[tokio::test]
async fn test_run_recovers_items_left_downloading() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    let orphan = h.queue.claim_next().await.unwrap().unwrap();
    assert_eq!(orphan.status, QueueStatus::Downloading);

    let summary = h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(
        h.scheduler.get("trk-1").await.unwrap().status,
        QueueStatus::Completed
    );
}

#[tokio::test]
async fn test_failed_completion_write_returns_item_to_queue() {
    let h = harness_with_store(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
        |queue| {
            Arc::new(FaultyRepository::failing_update_to(
                queue,
                QueueStatus::Completed,
                1,
            ))
        },
    )
    .await;
    let (_, mut rx) = h.bridge.subscribe_channel();
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.interrupted, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(h.fetcher.calls_for("trk-1"), 2);
    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert_eq!(h.scheduler.stats().await.unwrap().downloading, 0);
    assert_eq!(h.scheduler.history(&HistoryQuery::default()).await.unwrap().len(), 1);

    let mut statuses = Vec::new();
    while let Ok(item) = rx.try_recv() {
        statuses.push(item.status);
    }
    let first_claim = statuses
        .iter()
        .position(|status| *status == QueueStatus::Downloading)
        .unwrap();
    assert!(statuses[first_claim..].contains(&QueueStatus::Pending));
}

#[tokio::test]
async fn test_failed_requeue_write_returns_item_to_queue() {
    let h = harness_with_store(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
        |queue| Arc::new(FaultyRepository::failing_requeue(queue, 1)),
    )
    .await;
    h.fetcher.script("trk-1", &[Step::Transient, Step::Ok(500)]);
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    let summary = h.scheduler.run_until_idle().await.unwrap();

    assert_eq!(summary.interrupted, 1);
    assert_eq!(summary.requeued, 0);
    assert_eq!(summary.completed, 1);
    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Completed);
    assert!(item.error_message.is_none());
    assert_eq!(h.scheduler.stats().await.unwrap().downloading, 0);
}

#[tokio::test]
async fn test_failed_pause_write_still_settles_as_paused() {
    let h = harness_with_store(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
        |queue| {
            Arc::new(FaultyRepository::failing_update_to(
                queue,
                QueueStatus::Paused,
                1,
            ))
        },
    )
    .await;
    let gate = h.fetcher.gate("trk-1");
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;

    stop_during_gated_fetch(&h, &gate, |s| async move { s.pause("trk-1").await }).await;

    let item = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(item.status, QueueStatus::Paused);
    assert_eq!(item.stop_request, None);
    assert_eq!(h.scheduler.stats().await.unwrap().downloading, 0);
}

#[tokio::test]
async fn test_worker_panic_fails_only_that_item() {
    let h = harness(
        manifest(&["trk-1", "trk-2"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;
    h.fetcher.script("trk-1", &[Step::Panic]);
    enqueue(&h.scheduler, "trk-1", ItemKind::Track).await;
    enqueue(&h.scheduler, "trk-2", ItemKind::Track).await;

    let summary = h.scheduler.run_until_idle().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 1);

    let panicked = h.scheduler.get("trk-1").await.unwrap();
    assert_eq!(panicked.status, QueueStatus::Failed);
    assert!(panicked.error_message.unwrap().starts_with("worker panicked"));
    assert_eq!(
        h.scheduler.get("trk-2").await.unwrap().status,
        QueueStatus::Completed
    );
}

#[tokio::test]
async fn test_enqueue_validation() {
    let h = harness(
        manifest(&["trk-1"], &[]),
        ScriptedFetcher::default(),
        RecordingTagger::default(),
        |config| config,
    )
    .await;

    assert!(matches!(
        h.scheduler
            .enqueue("  ", ItemKind::Track, EnqueueHints::default())
            .await,
        Err(EngineError::EmptyId)
    ));
    enqueue(&h.scheduler, " trk-1 ", ItemKind::Track).await;
    let err = h
        .scheduler
        .enqueue("trk-1", ItemKind::Track, EnqueueHints::default())
        .await
        .unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(h.scheduler.list(0, 10, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("queue.db")).await.unwrap();
    let pipeline = MediaPipeline::new(
        Arc::new(ManifestCatalog::default()),
        Arc::new(ScriptedFetcher::default()),
        Arc::new(RecordingTagger::default()),
    );
    let result = Scheduler::new(
        EngineConfig::new(PathBuf::from("music")).with_concurrency(0),
        Queue::new(db),
        pipeline,
        Arc::new(NotificationBridge::new()),
    );
    assert!(matches!(result, Err(EngineError::Config(_))));
}
