//! Queue item types and status definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by exactly one worker.
    Downloading,
    /// Stopped by the user at a track boundary; resumable.
    Paused,
    /// Finished, possibly with some child tracks missing.
    Completed,
    /// Terminal failure for this run.
    Failed,
}

impl QueueStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Downloading,
        Self::Paused,
        Self::Completed,
        Self::Failed,
    ];

    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for states the scheduler never leaves on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid queue status: {s}")),
        }
    }
}

/// Catalog entity a queue item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A single audio track.
    Track,
    /// An album, decomposed into its tracks.
    Album,
    /// A playlist, decomposed into its tracks.
    Playlist,
    /// An artist, decomposed into the tracks the catalog lists for them.
    Artist,
}

impl ItemKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Artist => "artist",
        }
    }

    /// Returns true for kinds whose work is split into child tracks.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        !matches!(self, Self::Track)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(Self::Track),
            "album" => Ok(Self::Album),
            "playlist" => Ok(Self::Playlist),
            "artist" => Ok(Self::Artist),
            _ => Err(format!("invalid item kind: {s}")),
        }
    }
}

/// A pause or cancel waiting for the worker that holds an item.
///
/// Stored on the row, so a process other than the one running the worker can
/// ask for it. Cancel outranks pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRequest {
    /// Stop at the next unit boundary and become paused.
    Pause,
    /// Stop at the next unit boundary and fail as cancelled by the user.
    Cancel,
}

impl StopRequest {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for StopRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StopRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(Self::Pause),
            "cancel" => Ok(Self::Cancel),
            _ => Err(format!("invalid stop request: {s}")),
        }
    }
}

/// Display metadata supplied by the caller at enqueue time.
///
/// The catalog's resolution overwrites these once the worker runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueHints {
    /// Title hint.
    pub title: Option<String>,
    /// Artist hint.
    pub artist: Option<String>,
    /// Album hint.
    pub album: Option<String>,
}

/// A single item in the download queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Catalog identifier; primary key.
    pub id: String,
    /// Catalog entity kind.
    pub kind: ItemKind,
    /// Display title.
    pub title: String,
    /// Display artist.
    pub artist: String,
    /// Display album.
    pub album: String,
    /// Current lifecycle status.
    pub status: QueueStatus,
    /// Percentage in `0..=100`.
    pub progress: u8,
    /// File (track) or directory (composite) written by the pipeline.
    pub output_path: Option<String>,
    /// Stream locator the track was fetched from.
    pub download_url: Option<String>,
    /// Last recorded failure.
    pub error_message: Option<String>,
    /// Number of automatic requeues after failure in this run.
    pub retry_count: u32,
    /// Number of child tracks; zero for tracks and unresolved composites.
    pub total_tracks: u32,
    /// Number of distinct child tracks downloaded.
    pub completed_tracks: u32,
    /// Child track ids downloaded so far.
    pub completed_children: Vec<String>,
    /// Child track ids that failed terminally in this run.
    pub failed_children: Vec<String>,
    /// Bytes written to disk across all units of this item.
    pub bytes_downloaded: u64,
    /// Claim-order key; moves to "now" when the item re-enters the queue.
    pub queued_at: DateTime<Utc>,
    /// Earliest claim time after a retry backoff.
    pub not_before: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last persisted mutation.
    pub updated_at: DateTime<Utc>,
    /// First arrival at `completed` or terminal `failed` in this run.
    pub completed_at: Option<DateTime<Utc>>,
    /// Pending pause or cancel; only ever set while downloading.
    pub stop_request: Option<StopRequest>,
}

impl QueueItem {
    /// Creates a pending item stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ItemKind, hints: EnqueueHints) -> Self {
        let now = now_utc();
        Self {
            id: id.into(),
            kind,
            title: hints.title.unwrap_or_default(),
            artist: hints.artist.unwrap_or_default(),
            album: hints.album.unwrap_or_default(),
            status: QueueStatus::Pending,
            progress: 0,
            output_path: None,
            download_url: None,
            error_message: None,
            retry_count: 0,
            total_tracks: 0,
            completed_tracks: 0,
            completed_children: Vec::new(),
            failed_children: Vec::new(),
            bytes_downloaded: 0,
            queued_at: now,
            not_before: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            stop_request: None,
        }
    }

    /// Returns true for album, playlist and artist items.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.kind.is_composite()
    }

    /// Completed with fewer finished children than the item holds.
    #[must_use]
    pub fn is_partial_success(&self) -> bool {
        self.status == QueueStatus::Completed
            && self.total_tracks > 0
            && self.completed_tracks < self.total_tracks
    }

    /// Serializes a child-id list for database storage.
    pub(crate) fn serialize_children(children: &[String]) -> String {
        serde_json::to_string(children).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueItem {{ id: {}, kind: {}, status: {}, progress: {}% }}",
            self.id, self.kind, self.status, self.progress
        )
    }
}

impl<'r> FromRow<'r, SqliteRow> for QueueItem {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let kind: String = row.try_get("kind")?;
        let completed_children: String = row.try_get("completed_children")?;
        let failed_children: String = row.try_get("failed_children")?;
        let stop_request: Option<String> = row.try_get("stop_request")?;

        Ok(Self {
            id: row.try_get("id")?,
            kind: kind.parse().map_err(|e: String| decode_error("kind", e))?,
            title: row.try_get("title")?,
            artist: row.try_get("artist")?,
            album: row.try_get("album")?,
            status: status
                .parse()
                .map_err(|e: String| decode_error("status", e))?,
            progress: column_int(row, "progress")?,
            output_path: row.try_get("output_path")?,
            download_url: row.try_get("download_url")?,
            error_message: row.try_get("error_message")?,
            retry_count: column_int(row, "retry_count")?,
            total_tracks: column_int(row, "total_tracks")?,
            completed_tracks: column_int(row, "completed_tracks")?,
            completed_children: serde_json::from_str(&completed_children)
                .map_err(|e| decode_error("completed_children", e.to_string()))?,
            failed_children: serde_json::from_str(&failed_children)
                .map_err(|e| decode_error("failed_children", e.to_string()))?,
            bytes_downloaded: column_int(row, "bytes_downloaded")?,
            queued_at: from_micros(row.try_get("queued_at")?, "queued_at")?,
            not_before: row
                .try_get::<Option<i64>, _>("not_before")?
                .map(|v| from_micros(v, "not_before"))
                .transpose()?,
            created_at: from_micros(row.try_get("created_at")?, "created_at")?,
            updated_at: from_micros(row.try_get("updated_at")?, "updated_at")?,
            completed_at: row
                .try_get::<Option<i64>, _>("completed_at")?
                .map(|v| from_micros(v, "completed_at"))
                .transpose()?,
            stop_request: stop_request
                .map(|raw| raw.parse().map_err(|e: String| decode_error("stop_request", e)))
                .transpose()?,
        })
    }
}

/// Current UTC time truncated to the microsecond precision stored on disk.
pub(crate) fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

pub(crate) fn from_micros(value: i64, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| decode_error(column, format!("timestamp out of range: {value}")))
}

fn column_int<T: TryFrom<i64>>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    T::try_from(raw).map_err(|_| decode_error(column, format!("value out of range: {raw}")))
}

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}
