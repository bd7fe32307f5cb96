//! One worker run: resolve, fetch, tag, then persist the outcome.
//!
//! A track is a single unit. A composite is resolved once and then walks its
//! children in catalog order; each child is a unit. Stop requests are checked
//! before resolution, before every child and once more after the last unit,
//! never in the middle of a fetch. A pause or cancel that lands during the
//! final unit is still honoured; a shutdown interrupt at that point lets the
//! finished item complete.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::pipeline::paths::collection_dir;
use crate::pipeline::{
    FetchRequest, FetchedFile, NoProgress, PipelineError, ResolvedMedia, StreamLocator,
    TagMetadata, TransferProgress,
};
use crate::progress;
use crate::queue::{ItemKind, QueueItem};
use crate::retry::classify_error;

use super::control::{ItemControl, StopSignal};
use super::persistence::{persist_failure, persist_snapshot, persist_stop, persist_success};
use super::{Inner, WorkerOutcome};

enum RunEnd {
    Done,
    Stopped(StopSignal),
}

#[instrument(skip_all, fields(item_id = %item.id, kind = %item.kind))]
pub(super) async fn run(inner: &Inner, mut item: QueueItem, control: &ItemControl) -> WorkerOutcome {
    debug!(retry_count = item.retry_count, "worker started");

    let result = if item.is_composite() {
        run_composite(inner, &mut item, control).await
    } else {
        run_track(inner, &mut item, control).await
    };

    // A requeue would drop a pending pause or cancel, so a user stop wins
    // over a retryable failure.
    let result = match result {
        Err(error) if classify_error(&error).is_retryable() => {
            match user_stop(inner, &item.id, control).await {
                Some(signal) => Ok(RunEnd::Stopped(signal)),
                None => Err(error),
            }
        }
        other => other,
    };

    match result {
        Ok(RunEnd::Done) => persist_success(inner, item).await,
        Ok(RunEnd::Stopped(signal)) => persist_stop(inner, item, signal).await,
        Err(error) => persist_failure(inner, item, &error).await,
    }
}

async fn run_track(
    inner: &Inner,
    item: &mut QueueItem,
    control: &ItemControl,
) -> Result<RunEnd, PipelineError> {
    if let Some(signal) = requested_stop(inner, &item.id, control).await {
        return Ok(RunEnd::Stopped(signal));
    }

    let media = inner
        .pipeline
        .catalog
        .resolve(&item.id, ItemKind::Track)
        .await?;
    apply_metadata(item, &media);
    let stream = media
        .stream
        .clone()
        .ok_or_else(|| PipelineError::not_found(&item.id, "no stream available"))?;
    item.download_url = Some(stream.url.clone());
    persist_snapshot(inner, item).await;

    let request = fetch_request(inner, &item.id, media, stream);
    let sink = ItemProgressSink {
        inner,
        item: Mutex::new(item.clone()),
    };
    let fetched = inner.pipeline.fetcher.fetch(&request, &sink).await;
    *item = sink.item.into_inner();
    let fetched = fetched?;

    tag(inner, &request, &fetched).await;
    item.output_path = Some(fetched.path.display().to_string());
    item.bytes_downloaded = fetched.bytes;
    Ok(after_last_unit(inner, item, control).await)
}

async fn run_composite(
    inner: &Inner,
    item: &mut QueueItem,
    control: &ItemControl,
) -> Result<RunEnd, PipelineError> {
    if let Some(signal) = requested_stop(inner, &item.id, control).await {
        return Ok(RunEnd::Stopped(signal));
    }

    let media = inner.pipeline.catalog.resolve(&item.id, item.kind).await?;
    apply_metadata(item, &media);
    progress::set_children(item, &media.child_ids);
    item.output_path = Some(
        collection_dir(&inner.config.download_dir, item.kind, &media)
            .display()
            .to_string(),
    );
    persist_snapshot(inner, item).await;
    debug!(
        total_tracks = item.total_tracks,
        already_completed = item.completed_tracks,
        "composite resolved"
    );

    for (index, child_id) in media.child_ids.iter().enumerate() {
        if progress::is_child_settled(item, child_id) {
            continue;
        }
        if let Some(signal) = requested_stop(inner, &item.id, control).await {
            return Ok(RunEnd::Stopped(signal));
        }

        match fetch_child(inner, child_id, index).await {
            Ok(fetched) => {
                progress::record_child_success(item, child_id);
                item.bytes_downloaded = item.bytes_downloaded.saturating_add(fetched.bytes);
                persist_snapshot(inner, item).await;
            }
            Err(error) if classify_error(&error).is_retryable() => {
                debug!(child_id = %child_id, error = %error, "child failed; retrying item");
                return Err(error);
            }
            Err(error) => {
                warn!(child_id = %child_id, error = %error, "child track skipped");
                progress::record_child_failure(item, child_id);
                persist_snapshot(inner, item).await;
            }
        }
    }

    if let Some(signal) = user_stop(inner, &item.id, control).await {
        return Ok(RunEnd::Stopped(signal));
    }
    if item.total_tracks > 0 && item.completed_tracks == 0 {
        return Err(PipelineError::not_found(
            &item.id,
            format!("none of the {} tracks could be downloaded", item.total_tracks),
        ));
    }
    Ok(RunEnd::Done)
}

/// The strongest stop asked of `id`: the in-process flag or the request
/// stored on the row, which another process may have written.
async fn requested_stop(inner: &Inner, id: &str, control: &ItemControl) -> Option<StopSignal> {
    let local = control.requested();
    if local == Some(StopSignal::Cancel) {
        return local;
    }
    let stored = match inner.repo.get(id).await {
        Ok(row) => row.and_then(|row| row.stop_request).map(StopSignal::from),
        Err(error) => {
            warn!(item_id = %id, error = %error, "failed to read stop request");
            None
        }
    };
    local.max(stored)
}

/// Like [`requested_stop`], but ignores a bare shutdown interrupt.
async fn user_stop(inner: &Inner, id: &str, control: &ItemControl) -> Option<StopSignal> {
    requested_stop(inner, id, control)
        .await
        .filter(|signal| signal.is_user_request())
}

async fn after_last_unit(inner: &Inner, item: &QueueItem, control: &ItemControl) -> RunEnd {
    match user_stop(inner, &item.id, control).await {
        Some(signal) => RunEnd::Stopped(signal),
        None => RunEnd::Done,
    }
}

async fn fetch_child(
    inner: &Inner,
    child_id: &str,
    index: usize,
) -> Result<FetchedFile, PipelineError> {
    let media = inner
        .pipeline
        .catalog
        .resolve(child_id, ItemKind::Track)
        .await?;
    let mut stream = media
        .stream
        .clone()
        .ok_or_else(|| PipelineError::not_found(child_id, "no stream available"))?;
    if stream.track_number.is_none() {
        stream.track_number = u32::try_from(index + 1).ok();
    }

    let request = fetch_request(inner, child_id, media, stream);
    let fetched = inner.pipeline.fetcher.fetch(&request, &NoProgress).await?;
    tag(inner, &request, &fetched).await;
    Ok(fetched)
}

fn fetch_request(
    inner: &Inner,
    track_id: &str,
    media: ResolvedMedia,
    stream: StreamLocator,
) -> FetchRequest {
    FetchRequest {
        track_id: track_id.to_string(),
        media,
        stream,
        download_dir: inner.config.download_dir.clone(),
        quality: inner.config.quality,
    }
}

/// Tagging failures never fail the download.
async fn tag(inner: &Inner, request: &FetchRequest, fetched: &FetchedFile) {
    let metadata = TagMetadata {
        track_id: request.track_id.clone(),
        title: request.media.title.clone(),
        artist: request.media.artist.clone(),
        album: request.media.album.clone(),
        track_number: request.stream.track_number,
        quality: inner.config.quality.as_str().to_string(),
    };
    if let Err(error) = inner.pipeline.tagger.embed(&fetched.path, &metadata).await {
        warn!(
            track_id = %request.track_id,
            path = %fetched.path.display(),
            error = %error,
            "tagging failed; keeping download"
        );
    }
}

fn apply_metadata(item: &mut QueueItem, media: &ResolvedMedia) {
    for (field, resolved) in [
        (&mut item.title, &media.title),
        (&mut item.artist, &media.artist),
        (&mut item.album, &media.album),
    ] {
        if !resolved.is_empty() {
            field.clone_from(resolved);
        }
    }
}

/// Persists track transfer progress whenever the percentage moves up.
struct ItemProgressSink<'a> {
    inner: &'a Inner,
    item: Mutex<QueueItem>,
}

#[async_trait]
impl TransferProgress for ItemProgressSink<'_> {
    async fn on_transfer(&self, received: u64, content_length: Option<u64>) {
        let Some(percent) = progress::transfer_percent(received, content_length) else {
            return;
        };
        let mut item = self.item.lock().await;
        if progress::advance(&mut item, percent) {
            persist_snapshot(self.inner, &mut item).await;
        }
    }
}
