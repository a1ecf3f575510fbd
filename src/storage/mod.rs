pub mod asset;
pub mod object;
pub mod task;

use thiserror::Error;

use crate::schedule::types::TaskStatus;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("task {id} is already {status}")]
    AlreadyTerminal { id: String, status: TaskStatus },

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Fixed-width RFC 3339 text so lexical order matches time order.
pub(crate) fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(id: &str, raw: &str) -> StorageResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp {:?}: {}", raw, e),
        })
}
