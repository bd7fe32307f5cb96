//! CLI command routing: builds the scheduler from resolved config and runs
//! one subcommand against it.

use std::sync::Arc;

use anyhow::{Context, Result};
use mediafetch_core::pipeline::{
    HttpStreamFetcher, ManifestCatalog, SidecarTagger, XChaChaDecryptor,
};
use mediafetch_core::{
    Database, EnqueueHints, HistoryQuery, MediaPipeline, NotificationBridge, Queue, QueueStatus,
    Scheduler,
};
use tracing::{debug, info};

use crate::app::config_manager::ResolvedConfig;
use crate::app::exit_handler::{ProcessExit, determine_exit_outcome};
use crate::app::progress_manager::{ProgressRenderer, describe};
use crate::cli::Command;

/// Opens the queue database and wires the reference collaborators.
pub(crate) async fn open_scheduler(config: &ResolvedConfig) -> Result<Scheduler> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open queue database '{}'", db_path.display()))?;
    debug!(path = %db_path.display(), "queue database opened");

    let catalog = match &config.catalog_file {
        Some(path) => ManifestCatalog::load(path)
            .with_context(|| format!("Failed to load catalog '{}'", path.display()))?,
        None => ManifestCatalog::default(),
    };
    let fetcher = HttpStreamFetcher::new(Arc::new(XChaChaDecryptor::new()))
        .context("Failed to build HTTP client")?;
    let pipeline = MediaPipeline::new(
        Arc::new(catalog),
        Arc::new(fetcher),
        Arc::new(SidecarTagger::new()),
    );

    Ok(Scheduler::new(
        config.engine.clone(),
        Queue::new(db),
        pipeline,
        Arc::new(NotificationBridge::new()),
    )?)
}

/// Runs `command` and returns the exit outcome.
pub(crate) async fn dispatch(
    command: &Command,
    config: &ResolvedConfig,
    show_progress: bool,
) -> Result<ProcessExit> {
    let scheduler = open_scheduler(config).await?;

    match command {
        Command::Add {
            id,
            kind,
            title,
            artist,
            album,
        } => {
            let hints = EnqueueHints {
                title: title.clone(),
                artist: artist.clone(),
                album: album.clone(),
            };
            let item = scheduler.enqueue(id, *kind, hints).await?;
            println!("added {} ({})", item.id, item.kind);
        }
        Command::List {
            status,
            offset,
            limit,
        } => {
            for item in scheduler.list(*offset, *limit, *status).await? {
                println!(
                    "{:<24} {:<8} {:<11} {:>3}%  {}",
                    item.id,
                    item.kind.as_str(),
                    item.status.as_str(),
                    item.progress,
                    describe(&item)
                );
            }
        }
        Command::Stats => {
            let stats = scheduler.stats().await?;
            for status in QueueStatus::ALL {
                println!("{:<11} {}", status.as_str(), stats.get(status));
            }
            println!("{:<11} {}", "total", stats.total());
        }
        Command::Pause { id } => {
            scheduler.pause(id).await?;
            println!("pause requested for {id}");
        }
        Command::Resume { id } => {
            scheduler.resume(id).await?;
            println!("resumed {id}");
        }
        Command::Retry { id } => {
            scheduler.retry(id).await?;
            println!("queued {id} for retry");
        }
        Command::Cancel { id } => {
            let item = scheduler.cancel(id).await?;
            if item.status == QueueStatus::Failed {
                println!("cancelled {id}");
            } else {
                println!("cancel requested for {id}");
            }
        }
        Command::Remove { id } => {
            scheduler.remove(id).await?;
            println!("removed {id}");
        }
        Command::Clear { status } => {
            let removed = scheduler.clear(*status).await?;
            println!("removed {removed} {status} items");
        }
        Command::History { id, limit } => {
            let query = HistoryQuery {
                track_id: id.clone(),
                limit: *limit,
                ..HistoryQuery::default()
            };
            for record in scheduler.history(&query).await? {
                println!(
                    "{}  {:<24} {} - {}  [{}]  {}",
                    record.downloaded_at.format("%Y-%m-%d %H:%M:%S"),
                    record.track_id,
                    record.artist,
                    record.title,
                    record.quality,
                    record.file_path
                );
            }
        }
        Command::Run => return run_queue(&scheduler, show_progress).await,
    }

    Ok(ProcessExit::Success)
}

/// Processes the queue until idle; Ctrl-C interrupts running items back to pending.
async fn run_queue(scheduler: &Scheduler, show_progress: bool) -> Result<ProcessExit> {
    if show_progress {
        scheduler.subscribe(ProgressRenderer::new());
    }

    let mut runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_until_idle().await })
    };

    let summary = tokio::select! {
        joined = &mut runner => joined.context("Queue runner panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received; stopping at the next unit boundary");
            scheduler.shutdown().await?;
            runner.await.context("Queue runner panicked")??
        }
    };

    println!(
        "completed {} ({} partial), failed {}, requeued {}, paused {}, cancelled {}, interrupted {}",
        summary.completed,
        summary.partial,
        summary.failed,
        summary.requeued,
        summary.paused,
        summary.cancelled,
        summary.interrupted
    );
    Ok(determine_exit_outcome(&summary))
}
