use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ProcessError, TaskProcessor};
use crate::provider::SpeechToText;
use crate::schedule::types::{Task, TaskInput, TaskOutput, TaskType};
use crate::storage::asset::{AssetStorage, NewAsset};
use crate::transcript::{normalizer_for, TranscriptNormalizer};
use crate::utils::http::file_name_from_url;

pub struct TranscribeProcessor {
    stt: Arc<dyn SpeechToText>,
    normalizer: Box<dyn TranscriptNormalizer>,
    assets: Arc<dyn AssetStorage>,
}

impl TranscribeProcessor {
    pub fn new(stt: Arc<dyn SpeechToText>, assets: Arc<dyn AssetStorage>) -> Self {
        let normalizer = normalizer_for(stt.kind());
        Self {
            stt,
            normalizer,
            assets,
        }
    }

    /// Register the source as an asset unless this owner already has one at
    /// the same location.
    async fn ensure_source_asset(
        &self,
        owner_id: Option<&str>,
        source_url: &str,
    ) -> Result<(), ProcessError> {
        let existing = self
            .assets
            .find_by_owner_and_location(owner_id, source_url)
            .await?;
        if !existing.is_empty() {
            return Ok(());
        }

        let display_name =
            file_name_from_url(source_url).unwrap_or_else(|| source_url.to_string());
        let asset = self
            .assets
            .create_asset(NewAsset {
                owner_id: owner_id.map(str::to_string),
                location: source_url.to_string(),
                display_name,
                description: None,
            })
            .await?;
        info!("Registered source asset {} for {}", asset.id, source_url);
        Ok(())
    }
}

#[async_trait]
impl TaskProcessor for TranscribeProcessor {
    fn task_type(&self) -> TaskType {
        TaskType::SpeechToText
    }

    async fn process(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, ProcessError> {
        let (source_url, language) = match &task.input {
            TaskInput::SpeechToText {
                source_url,
                language,
            } => (source_url, language.as_deref()),
            other => {
                return Err(ProcessError::InvalidInput {
                    processor: self.task_type(),
                    task_type: other.task_type(),
                })
            }
        };

        info!(
            "Transcribing {} for task {} with {}",
            source_url,
            task.id,
            self.stt.kind()
        );
        let raw = self
            .stt
            .transcribe_from_url(source_url, language, cancel)
            .await?;
        let transcript = self.normalizer.normalize(&raw)?;
        if transcript.is_none() {
            info!("No speech detected in {} (task {})", source_url, task.id);
        }

        Ok(TaskOutput::Transcript { transcript })
    }

    async fn after_commit(&self, task: &Task) -> Result<(), ProcessError> {
        match &task.input {
            TaskInput::SpeechToText { source_url, .. } => {
                self.ensure_source_asset(task.owner_id.as_deref(), source_url)
                    .await
            }
            _ => Ok(()),
        }
    }
}
