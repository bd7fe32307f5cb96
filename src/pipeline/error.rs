//! Error types for the media pipeline.
//!
//! Every collaborator (catalog, fetcher, decryptor, tagger) reports failures
//! through [`PipelineError`]; the worker classifies them for the retry policy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving, fetching, decrypting or tagging media.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The catalog has no such entity, or the stream is gone.
    #[error("not found: {id} ({reason})")]
    NotFound {
        /// Catalog id or stream locator.
        id: String,
        /// What was missing.
        reason: String,
    },

    /// Credentials were rejected or are missing.
    #[error("authentication failed: {message}")]
    Auth {
        /// Upstream message.
        message: String,
    },

    /// Temporary network or server failure.
    #[error("transient failure: {message}")]
    Transient {
        /// Upstream message.
        message: String,
    },

    /// A stream frame could not be decrypted.
    #[error("decryption failed: {message}")]
    Decryption {
        /// What went wrong.
        message: String,
    },

    /// Local filesystem failure.
    #[error("IO error writing to {path}: {source}")]
    Disk {
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The output path or stream locator is unusable.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Offending path or locator.
        path: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl PipelineError {
    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Creates a disk error.
    pub fn disk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Disk {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps an HTTP status from a stream or catalog request.
    ///
    /// 401/403 are auth failures, 404/410/451 mean the content is gone,
    /// 408/429 and 5xx are transient. Anything else is treated as gone.
    #[must_use]
    pub fn from_http_status(url: &str, status: u16) -> Self {
        match status {
            401 | 403 => Self::auth(format!("HTTP {status} from {url}")),
            408 | 429 | 500..=599 => Self::transient(format!("HTTP {status} from {url}")),
            _ => Self::not_found(url, format!("HTTP {status}")),
        }
    }
}
