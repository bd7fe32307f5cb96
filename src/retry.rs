//! Retry logic with exponential backoff for failed queue items.
//!
//! When a worker run fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - network/server hiccups and decryption errors
//! - [`FailureType::Permanent`] - content unavailable, disk and path errors
//! - [`FailureType::NeedsAuth`] - rejected credentials
//!
//! The [`RetryPolicy`] then decides, from the item's persisted `retry_count`,
//! whether the item goes back to the end of the queue (with a backoff
//! deadline) or fails terminally.
//!
//! # Example
//!
//! ```
//! use mediafetch_core::pipeline::PipelineError;
//! use mediafetch_core::retry::{RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = PipelineError::transient("HTTP 503 from cdn");
//!
//! match policy.should_retry(classify_error(&error), 0) {
//!     RetryDecision::Retry { delay, retry_count } => {
//!         println!("requeue #{retry_count} after {delay:?}");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("failed: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::pipeline::PipelineError;

/// Default number of automatic requeues per run.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Failure that won't succeed regardless of retries.
    Permanent,
    /// Credentials were rejected; retrying without new ones would not help.
    NeedsAuth,
}

impl FailureType {
    /// Returns true when the policy may requeue this failure.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Decision on whether to requeue a failed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the item.
    Retry {
        /// Earliest time, from now, the item may be claimed again.
        delay: Duration,
        /// Value `retry_count` takes after the requeue.
        retry_count: u32,
    },

    /// Fail the item terminally.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^retry_count, max_delay) + jitter
/// ```
///
/// Jitter is capped at half the computed delay, so a zero base delay
/// yields immediate requeues.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Creates a policy that requeues without any backoff delay.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    /// Returns the maximum number of requeues per run.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides the fate of a failed run.
    ///
    /// `retry_count` is the item's persisted count before this failure.
    /// A retryable failure is requeued while `retry_count < max_retries`, so
    /// an item that keeps failing ends with `retry_count == max_retries`.
    #[must_use]
    pub fn should_retry(&self, failure_type: FailureType, retry_count: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "authentication required - retry without new credentials would not help"
                        .to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if retry_count >= self.max_retries {
            debug!(retry_count, max = self.max_retries, "retries exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.calculate_delay(retry_count);
        debug!(
            retry_count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "will requeue"
        );

        RetryDecision::Retry {
            delay,
            retry_count: retry_count + 1,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn calculate_delay(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let delay_ms = base_ms * self.backoff_multiplier.powf(f64::from(retry_count));
        let capped_ms = delay_ms.min(self.max_delay.as_secs_f64() * 1000.0);
        let capped = Duration::from_millis(capped_ms as u64);

        capped + jitter(capped)
    }
}

fn jitter(delay: Duration) -> Duration {
    let bound = MAX_JITTER.min(delay / 2);
    if bound.is_zero() {
        return Duration::ZERO;
    }
    let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound_ms))
}

/// Classifies a pipeline error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Transient | Transient |
/// | Decryption | Transient |
/// | Auth | NeedsAuth |
/// | NotFound | Permanent |
/// | Disk | Permanent |
/// | InvalidPath | Permanent |
#[must_use]
pub fn classify_error(error: &PipelineError) -> FailureType {
    match error {
        PipelineError::Transient { .. } | PipelineError::Decryption { .. } => FailureType::Transient,
        PipelineError::Auth { .. } => FailureType::NeedsAuth,
        PipelineError::NotFound { .. }
        | PipelineError::Disk { .. }
        | PipelineError::InvalidPath { .. } => FailureType::Permanent,
    }
}
