//! Error types for queue operations.

use std::fmt;

use thiserror::Error;

use super::QueueStatus;

/// Structured classification for queue/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Append-only trigger rejected a history mutation.
    AppendOnly,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// A stored value could not be decoded into a queue type.
    Decode,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl QueueDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Self::Decode,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for QueueDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::AppendOnly => "append_only",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::Decode => "decode",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> QueueDbErrorKind {
    let message = database_error.message().to_ascii_lowercase();
    if message.contains("append-only") {
        return QueueDbErrorKind::AppendOnly;
    }

    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) || message.contains("database is locked")
        || message.contains("database is busy")
    {
        return QueueDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT") || value == "19")
    {
        return QueueDbErrorKind::ConstraintViolation;
    }

    QueueDbErrorKind::Other
}

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: QueueDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Queue item not found.
    #[error(
        "queue item not found: {0}\n  Suggestion: The item may have been removed or the ID is incorrect"
    )]
    ItemNotFound(String),

    /// An item with this id is already queued.
    #[error(
        "item already queued: {0}\n  Suggestion: Use 'retry' to run a finished item again"
    )]
    DuplicateId(String),

    /// The operation is not allowed from the item's current status.
    #[error("cannot {operation} item {id} while it is {status}")]
    InvalidTransition {
        /// Item the operation targeted.
        id: String,
        /// Status observed when the operation was rejected.
        status: QueueStatus,
        /// Operation name (pause, resume, retry, cancel, remove).
        operation: &'static str,
    },
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: QueueDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl QueueError {
    /// Creates an `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(id: &str, status: QueueStatus, operation: &'static str) -> Self {
        Self::InvalidTransition {
            id: id.to_string(),
            status,
            operation,
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<QueueDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::ItemNotFound(_) | Self::DuplicateId(_) | Self::InvalidTransition { .. } => None,
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(QueueDbErrorKind::BusyOrLocked)
    }
}
