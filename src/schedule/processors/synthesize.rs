use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::{ProcessError, TaskProcessor};
use crate::provider::TextToSpeech;
use crate::schedule::types::{Task, TaskInput, TaskOutput, TaskType};
use crate::storage::asset::{AssetStorage, NewAsset};
use crate::storage::object::ObjectStorage;

const KEY_PREFIX: &str = "text-to-speech";

pub struct SynthesizeProcessor {
    tts: Arc<dyn TextToSpeech>,
    objects: Arc<dyn ObjectStorage>,
    assets: Arc<dyn AssetStorage>,
}

impl SynthesizeProcessor {
    pub fn new(
        tts: Arc<dyn TextToSpeech>,
        objects: Arc<dyn ObjectStorage>,
        assets: Arc<dyn AssetStorage>,
    ) -> Self {
        Self {
            tts,
            objects,
            assets,
        }
    }
}

/// `text-to-speech/<owner|system>/<unix millis>-<uuid>.<ext>`
pub(crate) fn object_key(owner_id: Option<&str>, extension: &str) -> String {
    let owner = match owner_id {
        Some(owner) => owner
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect(),
        None => "system".to_string(),
    };
    format!(
        "{}/{}/{}-{}.{}",
        KEY_PREFIX,
        owner,
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

#[async_trait]
impl TaskProcessor for SynthesizeProcessor {
    fn task_type(&self) -> TaskType {
        TaskType::TextToSpeech
    }

    async fn process(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, ProcessError> {
        let (text, voice) = match &task.input {
            TaskInput::TextToSpeech { text, voice } => (text, voice.as_deref()),
            other => {
                return Err(ProcessError::InvalidInput {
                    processor: self.task_type(),
                    task_type: other.task_type(),
                })
            }
        };

        info!(
            "Synthesizing {} chars for task {} with {}",
            text.chars().count(),
            task.id,
            self.tts.kind()
        );
        let audio = self.tts.synthesize(text, voice, cancel).await?;
        let extension = audio.extension();
        let key = object_key(task.owner_id.as_deref(), extension);
        let size = audio.data.len();
        let output_url = self.objects.put(&key, audio.data, &audio.content_type).await?;
        info!("Stored {} bytes of audio for task {} at {}", size, task.id, output_url);

        // one asset per synthesis, identical text still gets its own
        self.assets
            .create_asset(NewAsset {
                owner_id: task.owner_id.clone(),
                location: output_url.clone(),
                display_name: format!("{}-tts.{}", self.tts.kind(), extension),
                description: Some(text.clone()),
            })
            .await?;

        Ok(TaskOutput::Audio { output_url })
    }
}
