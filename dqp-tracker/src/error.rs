//! Error types for dqp-tracker
//!
//! Invalid input is rejected before any lock is taken. Lock contention that
//! outlasts the configured wait surfaces as [`TrackerError::LockTimeout`],
//! which callers may retry; nothing has been applied when it is returned.

use thiserror::Error;

/// Tracker error type
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Caller supplied something the tracker cannot act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The entity lock could not be acquired within the configured wait
    #[error("{operation}: entity still locked after {attempts} attempts ({elapsed_ms} ms elapsed, max {max_wait_ms} ms)")]
    LockTimeout {
        operation: String,
        attempts: u32,
        elapsed_ms: u64,
        max_wait_ms: u64,
    },

    /// Record store failure
    #[error("Store error: {0}")]
    Store(dqp_common::Error),
}

impl TrackerError {
    /// True if retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::LockTimeout { .. } => true,
            TrackerError::Store(dqp_common::Error::Conflict(_)) => true,
            TrackerError::Store(err) => err.is_lock_contention(),
            TrackerError::InvalidInput(_) => false,
        }
    }
}

impl From<dqp_common::Error> for TrackerError {
    fn from(err: dqp_common::Error) -> Self {
        match err {
            dqp_common::Error::InvalidInput(msg) => TrackerError::InvalidInput(msg),
            other => TrackerError::Store(other),
        }
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
