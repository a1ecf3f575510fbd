pub mod synthesize;
pub mod transcribe;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::provider::ProviderError;
use crate::schedule::types::{Task, TaskOutput, TaskType};
use crate::storage::StorageError;
use crate::transcript::NormalizationError;

pub use synthesize::SynthesizeProcessor;
pub use transcribe::TranscribeProcessor;

/// Anything that goes wrong while a task runs. The display text becomes the
/// task's failure message.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to normalize transcript: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{processor} processor cannot handle a {task_type} task")]
    InvalidInput {
        processor: TaskType,
        task_type: TaskType,
    },
}

#[async_trait]
pub trait TaskProcessor: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Run the task to its output. Side effects the output depends on, such
    /// as stored audio, happen here before the result is written back.
    async fn process(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, ProcessError>;

    /// Called once the completed result has been stored. Never runs for a
    /// task that failed or was cancelled first.
    async fn after_commit(&self, _task: &Task) -> Result<(), ProcessError> {
        Ok(())
    }
}
