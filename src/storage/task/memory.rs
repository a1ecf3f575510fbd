use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{rejected_write, TaskQuery, TaskStorage};
use crate::schedule::types::{Task, TaskOutcome, TaskState, TaskStatus};
use crate::storage::{StorageError, StorageResult};

#[derive(Default)]
struct TaskTable {
    tasks: HashMap<String, Task>,
    // insertion order, breaks created_at ties
    order: Vec<String>,
}

/// Process-local task store.
#[derive(Default)]
pub struct InMemoryTaskStorage {
    table: RwLock<TaskTable>,
}

impl InMemoryTaskStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

#[async_trait]
impl TaskStorage for InMemoryTaskStorage {
    async fn create(&self, task: &Task) -> StorageResult<()> {
        let mut table = self.table.write().map_err(poisoned)?;
        if table.tasks.contains_key(&task.id) {
            return Err(StorageError::Duplicate(task.id.clone()));
        }
        table.order.push(task.id.clone());
        table.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> StorageResult<Option<Task>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.tasks.get(task_id).cloned())
    }

    async fn list(&self, query: &TaskQuery) -> StorageResult<(Vec<Task>, u64)> {
        let table = self.table.read().map_err(poisoned)?;
        let mut matched: Vec<&Task> = table
            .order
            .iter()
            .rev()
            .filter_map(|id| table.tasks.get(id))
            .filter(|task| query.matches(task))
            .collect();
        // stable, so equal timestamps keep newest-inserted first
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn mark_processing(&self, task_id: &str) -> StorageResult<Task> {
        let mut table = self.table.write().map_err(poisoned)?;
        let task = table
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;
        if task.status() != TaskStatus::Pending {
            return Err(rejected_write(task, TaskStatus::Processing));
        }
        task.state = TaskState::Processing;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn update_result(&self, task_id: &str, outcome: &TaskOutcome) -> StorageResult<Task> {
        let mut table = self.table.write().map_err(poisoned)?;
        let task = table
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;
        let state = TaskState::from(outcome.clone());
        if task.state.is_terminal() {
            return Err(rejected_write(task, state.status()));
        }
        task.state = state;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}
