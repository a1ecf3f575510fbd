use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::schedule::callback::TaskCallback;
use crate::schedule::processors::TaskProcessor;
use crate::schedule::types::{Task, TaskOutcome, TaskState};
use crate::storage::task::TaskStorage;
use crate::storage::StorageError;

/// Drives one submitted task from pending to its terminal state.
///
/// Each worker is a detached unit; nothing awaits it except shutdown. Every
/// error it meets ends up either on the task record or, when even that write
/// fails, in the stuck counter and a `Stuck` event.
pub struct TaskWorker {
    task_id: String,
    storage: Arc<dyn TaskStorage>,
    processor: Arc<dyn TaskProcessor>,
    callbacks: Vec<Arc<dyn TaskCallback>>,
    cancel: CancellationToken,
    stuck_writes: Arc<AtomicU64>,
}

impl TaskWorker {
    pub fn new(
        task_id: String,
        storage: Arc<dyn TaskStorage>,
        processor: Arc<dyn TaskProcessor>,
        cancel: CancellationToken,
        stuck_writes: Arc<AtomicU64>,
    ) -> Self {
        Self {
            task_id,
            storage,
            processor,
            callbacks: Vec::new(),
            cancel,
            stuck_writes,
        }
    }

    pub fn with_callbacks(mut self, callbacks: Vec<Arc<dyn TaskCallback>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub async fn run(self) {
        let task = match self.storage.mark_processing(&self.task_id).await {
            Ok(task) => task,
            Err(StorageError::AlreadyTerminal { status, .. }) => {
                info!("Task {} already {} before processing started", self.task_id, status);
                return;
            }
            Err(e @ StorageError::InvalidTransition { .. }) => {
                warn!("Task {} not started: {}", self.task_id, e);
                return;
            }
            Err(e) => {
                self.report_stuck(&e.to_string()).await;
                return;
            }
        };

        for callback in &self.callbacks {
            if let Err(e) = callback.on_start(&task).await {
                warn!("Start callback failed for task {}: {}", task.id, e);
            }
        }

        info!("Processing {} task: {}", task.task_type(), task.id);
        let outcome = self.execute(task.clone()).await;

        match self.storage.update_result(&self.task_id, &outcome).await {
            Ok(task) => {
                info!("Task {} finished as {}", task.id, task.status());
                if matches!(task.state, TaskState::Completed { .. }) {
                    if let Err(e) = self.processor.after_commit(&task).await {
                        error!("Post-commit step failed for completed task {}: {}", task.id, e);
                    }
                }
                self.notify_terminal(&task).await;
            }
            Err(StorageError::AlreadyTerminal { status, .. }) => {
                // cancelled while running, first terminal write wins
                warn!(
                    "Discarding result of task {}: already {}",
                    self.task_id, status
                );
            }
            Err(e) => self.report_stuck(&e.to_string()).await,
        }
    }

    /// Runs the processor in its own spawned unit so that a panic is turned
    /// into a failure instead of leaving the task in processing.
    async fn execute(&self, task: Task) -> TaskOutcome {
        let processor = self.processor.clone();
        let cancel = self.cancel.clone();
        let task_id = task.id.clone();
        let handle = tokio::spawn(async move { processor.process(&task, &cancel).await });

        match handle.await {
            Ok(Ok(output)) => TaskOutcome::Completed(output),
            Ok(Err(e)) => {
                warn!("Task {} failed: {}", task_id, e);
                TaskOutcome::Failed(e.to_string())
            }
            Err(e) => {
                error!("Processor for task {} aborted: {}", task_id, e);
                TaskOutcome::Failed(format!("processor aborted: {}", e))
            }
        }
    }

    async fn notify_terminal(&self, task: &Task) {
        for callback in &self.callbacks {
            let result = match &task.state {
                TaskState::Completed { output } => callback.on_complete(task, output).await,
                TaskState::Failed { message } => callback.on_error(task, message).await,
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!("Callback failed for task {}: {}", task.id, e);
            }
        }
    }

    async fn report_stuck(&self, reason: &str) {
        let count = self.stuck_writes.fetch_add(1, Ordering::SeqCst) + 1;
        error!(
            "Task {} is stuck, status write failed: {} ({} stuck so far)",
            self.task_id, reason, count
        );
        for callback in &self.callbacks {
            if let Err(e) = callback.on_stuck(&self.task_id, reason).await {
                warn!("Stuck callback failed for task {}: {}", self.task_id, e);
            }
        }
    }
}
