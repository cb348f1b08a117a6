//! Common error types for DQP

use thiserror::Error;

/// Common result type for DQP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the DQP crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Progress document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity lock still held by another transaction
    #[error("Entity locked: {0}")]
    Locked(String),

    /// Entity changed underneath an open transaction
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying store reported lock contention.
    ///
    /// SQLite surfaces both `SQLITE_BUSY` ("database is locked") and
    /// `SQLITE_LOCKED` ("database table is locked") as plain messages.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Locked(_) => true,
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => {
                let msg = db_err.to_string();
                msg.contains("database is locked") || msg.contains("database table is locked")
            }
            _ => false,
        }
    }
}
