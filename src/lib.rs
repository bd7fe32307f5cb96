//! Mediafetch Core Library
//!
//! A durable download queue and worker pool for catalog media. Callers add
//! tracks, albums, playlists or artists to a `SQLite`-backed queue; a
//! bounded pool of workers resolves each item through a catalog, streams and
//! decrypts its audio, tags the files and records the outcome.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`queue`] - Queue persistence, lifecycle transitions and download history
//! - [`scheduler`] - Dispatch loop, workers, pause/cancel/retry control
//! - [`pipeline`] - Catalog, stream transport, decryption and tagging seams
//! - [`retry`] - Failure classification and backoff policy
//! - [`progress`] - Percentage roll-up for tracks and composites
//! - [`notify`] - Fan-out of item snapshots to observers
//! - [`config`] - Engine configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod notify;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod scheduler;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_CONCURRENCY, EngineConfig, Quality};
pub use db::Database;
pub use notify::{ItemListener, NotificationBridge, SubscriptionId};
pub use pipeline::{MediaPipeline, PipelineError};
pub use queue::{
    EnqueueHints, HistoryQuery, HistoryRecord, ItemKind, Queue, QueueError, QueueItem,
    QueueRepository, QueueStats, QueueStatus, StopRequest,
};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
};
pub use scheduler::{EngineError, RunSummary, Scheduler};
