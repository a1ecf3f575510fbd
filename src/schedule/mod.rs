use std::sync::Arc;

pub mod callback;
pub mod error;
pub mod pagination;
pub mod processors;
pub mod scheduler;
pub mod types;
#[cfg(test)]
mod tests;

pub use callback::{EventCallback, TaskCallback, TaskEvent};
pub use error::TaskError;
pub use pagination::Pagination;
pub use processors::{ProcessError, SynthesizeProcessor, TaskProcessor, TranscribeProcessor};
pub use scheduler::TaskManager;
pub use types::{
    SubmitRequest, Task, TaskFilter, TaskInput, TaskOutput, TaskPage, TaskState, TaskStatus,
    TaskType,
};

use crate::provider::{SpeechToText, TextToSpeech};
use crate::storage::asset::AssetStorage;
use crate::storage::object::ObjectStorage;
use crate::storage::task::TaskStorage;

/// Task manager with the speech-to-text and text-to-speech processors
/// registered.
pub fn create_task_manager(
    tasks: Arc<dyn TaskStorage>,
    assets: Arc<dyn AssetStorage>,
    objects: Arc<dyn ObjectStorage>,
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
) -> TaskManager {
    let mut manager = TaskManager::new(tasks);
    manager.register_processor(Arc::new(TranscribeProcessor::new(stt, assets.clone())));
    manager.register_processor(Arc::new(SynthesizeProcessor::new(tts, objects, assets)));
    manager
}
