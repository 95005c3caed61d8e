//! Error types for the store, the queue facade and job handlers.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable, locked or failing I/O. Transient.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate job id: {0}")]
    DuplicateId(String),
    #[error("job not found: {0}")]
    NotFound(String),
    /// A persisted row could not be decoded.
    #[error("corrupt job record: {0}")]
    Corrupt(String),
    /// Backend rejected the call (bad statement, constraint, bind failure).
    /// Retrying the same call fails the same way.
    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether a retry with backoff may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::Corrupt(e.to_string()),
            rusqlite::Error::SqliteFailure(ref err, _) => match err.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory
                | ErrorCode::FileLockingProtocolFailed => StoreError::Unavailable(e.to_string()),
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    StoreError::Corrupt(e.to_string())
                }
                _ => StoreError::Internal(e.to_string()),
            },
            other => StoreError::Internal(other.to_string()),
        }
    }
}

/// Errors surfaced by the queue facade to its callers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed submission; the job was never persisted.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("no handler registered for job type: {0}")]
    UnknownJobType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors a job handler returns.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),
    /// The handler honoured a cancel request at a checkpoint.
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    pub fn failed(msg: impl Into<String>) -> Self {
        JobError::Failed(msg.into())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        JobError::Failed(format!("invalid payload: {}", e))
    }
}
