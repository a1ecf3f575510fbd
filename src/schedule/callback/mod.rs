use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::schedule::types::{Task, TaskOutput};

/// Observer of task lifecycle transitions. Failures are logged by the caller
/// and never change the task's outcome.
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn on_start(&self, task: &Task) -> Result<()>;
    async fn on_complete(&self, task: &Task, output: &TaskOutput) -> Result<()>;
    async fn on_error(&self, task: &Task, error: &str) -> Result<()>;
    /// The terminal status could not be written; the stored task is left
    /// non-terminal.
    async fn on_stuck(&self, task_id: &str, error: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started { task_id: String },
    Completed { task: Task },
    Failed { task: Task },
    Stuck { task_id: String, error: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Started { task_id } | TaskEvent::Stuck { task_id, .. } => task_id,
            TaskEvent::Completed { task } | TaskEvent::Failed { task } => &task.id,
        }
    }
}

// in-process event fan-out
#[derive(Debug, Clone)]
pub struct EventCallback {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventCallback {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: TaskEvent) {
        // no receivers is fine
        let _ = self.sender.send(event);
    }
}

#[async_trait]
impl TaskCallback for EventCallback {
    async fn on_start(&self, task: &Task) -> Result<()> {
        self.publish(TaskEvent::Started {
            task_id: task.id.clone(),
        });
        Ok(())
    }

    async fn on_complete(&self, task: &Task, _output: &TaskOutput) -> Result<()> {
        self.publish(TaskEvent::Completed { task: task.clone() });
        Ok(())
    }

    async fn on_error(&self, task: &Task, _error: &str) -> Result<()> {
        self.publish(TaskEvent::Failed { task: task.clone() });
        Ok(())
    }

    async fn on_stuck(&self, task_id: &str, error: &str) -> Result<()> {
        self.publish(TaskEvent::Stuck {
            task_id: task_id.to_string(),
            error: error.to_string(),
        });
        Ok(())
    }
}
