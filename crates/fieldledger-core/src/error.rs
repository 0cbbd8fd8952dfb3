//! Error types for fieldledger-core

use thiserror::Error;

use crate::models::RecordId;

/// Result type alias using fieldledger-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldledger-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The id was unknown when the operation started
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// The record disappeared while a guarded write was retrying
    #[error("Record {0} was removed while the write was being retried")]
    RecordGone(RecordId),

    /// The conflict loop hit its attempt bound without committing
    #[error("Record {id} is under sustained contention; gave up after {attempts} attempts")]
    ConflictExhausted {
        /// Contended record
        id: RecordId,
        /// Attempts made, including the first
        attempts: u32,
    },

    /// A sync batch carried no items
    #[error("Sync batch is empty")]
    EmptyBatch,

    /// A sync batch carried more items than the configured bound
    #[error("Sync batch has {len} items; the limit is {max}")]
    BatchTooLarge {
        /// Submitted item count
        len: usize,
        /// Configured limit
        max: usize,
    },
}

