use async_trait::async_trait;

use crate::schedule::types::{Task, TaskFilter, TaskOutcome, TaskStatus, TaskType};
use crate::storage::{StorageError, StorageResult};

pub mod entity;
pub mod mapping;
pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTaskStorage;
pub use sqlite::SqliteTaskStorage;

/// Selection for [`TaskStorage::list`]. `owner_id = None` selects
/// system-originated tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub owner_id: Option<String>,
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub limit: u64,
    pub offset: u64,
}

impl TaskQuery {
    pub fn new(owner_id: Option<&str>, filter: &TaskFilter, limit: u64, offset: u64) -> Self {
        Self {
            owner_id: owner_id.map(str::to_string),
            task_type: filter.task_type,
            status: filter.status,
            limit,
            offset,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        task.owner_id == self.owner_id
            && self.task_type.map_or(true, |t| task.task_type() == t)
            && self.status.map_or(true, |s| task.status() == s)
    }
}

/// Durable record of tasks.
///
/// Every state write is conditional. `mark_processing` only moves a pending
/// task, and `update_result` only writes a task that is not yet terminal;
/// otherwise they fail with [`StorageError::AlreadyTerminal`] and leave the
/// record untouched.
#[async_trait]
pub trait TaskStorage: Send + Sync + 'static {
    async fn create(&self, task: &Task) -> StorageResult<()>;
    async fn get(&self, task_id: &str) -> StorageResult<Option<Task>>;
    /// Newest first, with the total number of matches ignoring limit/offset.
    async fn list(&self, query: &TaskQuery) -> StorageResult<(Vec<Task>, u64)>;
    async fn mark_processing(&self, task_id: &str) -> StorageResult<Task>;
    async fn update_result(&self, task_id: &str, outcome: &TaskOutcome) -> StorageResult<Task>;
}

/// Why a conditional write on `task` did not apply.
pub(crate) fn rejected_write(task: &Task, to: TaskStatus) -> StorageError {
    let status = task.status();
    if status.is_terminal() {
        StorageError::AlreadyTerminal {
            id: task.id.clone(),
            status,
        }
    } else {
        StorageError::InvalidTransition {
            id: task.id.clone(),
            from: status,
            to,
        }
    }
}
