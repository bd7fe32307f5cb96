//! Engine configuration.
//!
//! [`EngineConfig`] is built once by the caller, validated, and handed to
//! [`crate::Scheduler::new`]. Nothing in the library reads configuration
//! from the environment on its own.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, RetryPolicy};

/// Minimum allowed worker count.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed worker count.
pub const MAX_CONCURRENCY: usize = 32;

/// Default worker count.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default dispatch-loop poll interval when no work is claimable.
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(500);

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Worker count outside the supported range.
    #[error(
        "invalid concurrency value {0}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency(usize),

    /// No download directory configured.
    #[error("download directory must not be empty")]
    EmptyDownloadDir,

    /// Backoff delays are inconsistent.
    #[error("retry max delay {max_ms}ms is below base delay {base_ms}ms")]
    InvalidRetryDelay {
        /// Configured base delay in milliseconds.
        base_ms: u128,
        /// Configured max delay in milliseconds.
        max_ms: u128,
    },

    /// Poll interval of zero would spin the dispatch loop.
    #[error("idle poll interval must be greater than zero")]
    ZeroIdlePoll,

    /// Unknown quality label.
    #[error("unknown quality '{0}': expected one of mp3_128, mp3_320, flac")]
    UnknownQuality(String),
}

/// Audio quality requested from the stream provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// 128 kbit/s MP3.
    Mp3_128,
    /// 320 kbit/s MP3.
    #[default]
    Mp3_320,
    /// Lossless FLAC.
    Flac,
}

impl Quality {
    /// Label stored in history rows.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3_128 => "mp3_128",
            Self::Mp3_320 => "mp3_320",
            Self::Flac => "flac",
        }
    }

    /// File extension for downloaded audio.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3_128 | Self::Mp3_320 => "mp3",
            Self::Flac => "flac",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3_128" | "128" => Ok(Self::Mp3_128),
            "mp3_320" | "320" | "mp3" => Ok(Self::Mp3_320),
            "flac" | "lossless" => Ok(Self::Flac),
            other => Err(ConfigError::UnknownQuality(other.to_string())),
        }
    }
}

/// Typed engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of concurrent workers (1-32).
    pub concurrency: usize,
    /// Automatic requeues per run before an item fails.
    pub max_retries: u32,
    /// First backoff delay.
    pub retry_base_delay: Duration,
    /// Backoff ceiling.
    pub retry_max_delay: Duration,
    /// Requested audio quality.
    pub quality: Quality,
    /// Root directory for downloaded files.
    pub download_dir: PathBuf,
    /// How long the dispatch loop sleeps when nothing is claimable.
    pub idle_poll: Duration,
}

impl EngineConfig {
    /// Creates a configuration with defaults for everything but the directory.
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_BASE_DELAY,
            retry_max_delay: DEFAULT_MAX_DELAY,
            quality: Quality::default(),
            download_dir: download_dir.into(),
            idle_poll: DEFAULT_IDLE_POLL,
        }
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the retry budget and backoff delays.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self.retry_max_delay = self.retry_max_delay.max(base_delay);
        self
    }

    /// Sets the requested quality.
    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDownloadDir);
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(ConfigError::InvalidRetryDelay {
                base_ms: self.retry_base_delay.as_millis(),
                max_ms: self.retry_max_delay.as_millis(),
            });
        }
        if self.idle_poll.is_zero() {
            return Err(ConfigError::ZeroIdlePoll);
        }
        Ok(())
    }

    /// Retry policy derived from the backoff settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay, self.retry_max_delay)
    }
}
