use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;

use super::worker::TaskWorker;
use crate::schedule::callback::{EventCallback, TaskCallback, TaskEvent};
use crate::schedule::error::TaskError;
use crate::schedule::pagination::{page_info, Pagination};
use crate::schedule::processors::TaskProcessor;
use crate::schedule::types::{
    SubmitRequest, Task, TaskFilter, TaskOutcome, TaskPage, TaskState, TaskType,
};
use crate::storage::task::{TaskQuery, TaskStorage};

const EVENT_CAPACITY: usize = 256;
const DEFAULT_CANCEL_MESSAGE: &str = "cancelled by request";

/// Accepts tasks, persists them, and runs each one in its own detached unit.
pub struct TaskManager {
    storage: Arc<dyn TaskStorage>,
    processors: HashMap<TaskType, Arc<dyn TaskProcessor>>,
    callbacks: Vec<Arc<dyn TaskCallback>>,
    events: EventCallback,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    stuck_writes: Arc<AtomicU64>,
}

impl TaskManager {
    pub fn new(storage: Arc<dyn TaskStorage>) -> Self {
        let events = EventCallback::new(EVENT_CAPACITY);
        let event_sink: Arc<dyn TaskCallback> = Arc::new(events.clone());
        Self {
            storage,
            processors: HashMap::new(),
            callbacks: vec![event_sink],
            events,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            stuck_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn storage(&self) -> &Arc<dyn TaskStorage> {
        &self.storage
    }

    pub fn register_processor(&mut self, processor: Arc<dyn TaskProcessor>) {
        let task_type = processor.task_type();
        info!("Registering processor for task type: {}", task_type);
        self.processors.insert(task_type, processor);
    }

    pub fn register_callback(&mut self, callback: Arc<dyn TaskCallback>) {
        self.callbacks.push(callback);
    }

    /// Validate, persist as pending, and start processing in the background.
    ///
    /// Returns as soon as the record is stored; nothing here waits on a
    /// provider.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Task, TaskError> {
        if self.shutdown.is_cancelled() {
            return Err(TaskError::ShuttingDown);
        }

        let (input, owner_id) = request.into_input().map_err(TaskError::Validation)?;
        let task_type = input.task_type();
        let processor = self.processors.get(&task_type).cloned().ok_or_else(|| {
            TaskError::Validation(format!("no processor registered for {}", task_type))
        })?;

        let now = Utc::now();
        let task = Task {
            id: format!("task-{}", Uuid::new_v4()),
            owner_id,
            input,
            state: TaskState::Pending,
            created_at: now,
            updated_at: now,
        };

        self.storage
            .create(&task)
            .await
            .map_err(TaskError::Persistence)?;
        info!("Creating new {} task: {}", task_type, task.id);

        let worker = TaskWorker::new(
            task.id.clone(),
            self.storage.clone(),
            processor,
            self.shutdown.child_token(),
            self.stuck_writes.clone(),
        )
        .with_callbacks(self.callbacks.clone());
        self.tracker.spawn(worker.run());

        Ok(task)
    }

    pub async fn get_by_id(&self, task_id: &str) -> Result<Task, TaskError> {
        self.storage
            .get(task_id)
            .await
            .map_err(TaskError::Persistence)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    /// One page of an owner's tasks, newest first. `owner_id = None` lists
    /// system-originated tasks.
    pub async fn list_by_owner(
        &self,
        owner_id: Option<&str>,
        pagination: Pagination,
        filter: TaskFilter,
    ) -> Result<TaskPage, TaskError> {
        let (limit, offset) = pagination.check().map_err(TaskError::Validation)?;
        let query = TaskQuery::new(owner_id, &filter, limit, offset);
        let (tasks, total) = self
            .storage
            .list(&query)
            .await
            .map_err(TaskError::Persistence)?;
        let (page, total_pages) = page_info(total, limit, offset);

        Ok(TaskPage {
            tasks,
            total,
            limit,
            offset,
            page,
            total_pages,
        })
    }

    /// Fail a task that has not finished yet. An in-flight provider call is
    /// not interrupted; its result is dropped when it arrives.
    pub async fn cancel(&self, task_id: &str, message: Option<&str>) -> Result<Task, TaskError> {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_CANCEL_MESSAGE)
            .to_string();

        let task = self
            .storage
            .update_result(task_id, &TaskOutcome::Failed(message.clone()))
            .await?;
        info!("Cancelled task {}: {}", task_id, message);

        for callback in &self.callbacks {
            if let Err(e) = callback.on_error(&task, &message).await {
                warn!("Callback failed for task {}: {}", task.id, e);
            }
        }
        Ok(task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Terminal writes that failed and left a task non-terminal.
    pub fn stuck_writes(&self) -> u64 {
        self.stuck_writes.load(Ordering::SeqCst)
    }

    /// Number of tasks still being driven.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks, abort provider retries and wait for every running
    /// task to record its outcome.
    pub async fn shutdown(&self) {
        info!(
            "TaskManager shutting down with {} task(s) in flight",
            self.tracker.len()
        );
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("TaskManager stopped");
    }
}
