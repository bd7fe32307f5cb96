//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mediafetch_core::{ItemKind, Quality, QueueStatus};

/// Queue, fetch, decrypt and tag catalog media.
///
/// Items are kept in a durable queue under the download directory, so a
/// `run` interrupted by Ctrl-C or a crash picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand. Each overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Root directory for downloads and the queue database
    #[arg(short = 'd', long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-32)
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Maximum automatic retries for transient failures (0-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Audio quality: mp3_128, mp3_320 or flac
    #[arg(long, global = true)]
    pub quality: Option<Quality>,

    /// JSON catalog manifest used to resolve ids
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Disable progress bars during `run`
    #[arg(long, global = true)]
    pub no_progress: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add an item to the queue
    Add {
        /// Catalog id
        id: String,
        /// Item kind: track, album, playlist or artist
        #[arg(short, long, default_value = "track")]
        kind: ItemKind,
        /// Title hint shown until the catalog resolves the item
        #[arg(long)]
        title: Option<String>,
        /// Artist hint
        #[arg(long)]
        artist: Option<String>,
        /// Album hint
        #[arg(long)]
        album: Option<String>,
    },
    /// List queued items
    List {
        /// Only items in this status
        #[arg(short, long)]
        status: Option<QueueStatus>,
        /// Items to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Maximum items to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show per-status counts
    Stats,
    /// Pause a downloading item at its next track boundary
    Pause { id: String },
    /// Return a paused item to the queue
    Resume { id: String },
    /// Queue a completed or failed item again
    Retry { id: String },
    /// Cancel a pending, paused or downloading item
    Cancel { id: String },
    /// Delete an item that is not downloading
    Remove { id: String },
    /// Delete every item in a status
    Clear { status: QueueStatus },
    /// Show download history, newest first
    History {
        /// Only rows for this item id
        #[arg(long)]
        id: Option<String>,
        /// Maximum rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Process the queue until nothing is left to do
    Run,
}
