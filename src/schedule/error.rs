use thiserror::Error;

use crate::schedule::types::TaskStatus;
use crate::storage::StorageError;

/// Errors returned synchronously by the task manager.
///
/// Failures inside a running task never show up here; they are recorded on
/// the task itself as [`crate::schedule::types::TaskState::Failed`].
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task {id} is already {status}")]
    AlreadyTerminal { id: String, status: TaskStatus },

    #[error("task manager is shutting down")]
    ShuttingDown,

    #[error("persistence failure: {0}")]
    Persistence(#[source] StorageError),
}

impl From<StorageError> for TaskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => TaskError::NotFound(id),
            StorageError::AlreadyTerminal { id, status } => TaskError::AlreadyTerminal { id, status },
            other => TaskError::Persistence(other),
        }
    }
}
