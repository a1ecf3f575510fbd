use crate::schedule::types::{Task, TaskInput, TaskOutput, TaskState, TaskStatus, TaskType};
use crate::storage::task::entity::Model as TaskModel;
use crate::storage::{format_timestamp, parse_timestamp, StorageError};
use crate::transcript::SimpleTranscript;

const OUTPUT_AUDIO: &str = "audio";
const OUTPUT_TRANSCRIPT: &str = "transcript";

/// Columns that change with the task state.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StateColumns {
    pub status: String,
    pub output_url: Option<String>,
    pub output_kind: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_json: Option<String>,
    pub error_message: Option<String>,
}

impl TryFrom<&TaskState> for StateColumns {
    type Error = StorageError;

    fn try_from(state: &TaskState) -> Result<Self, Self::Error> {
        let mut columns = StateColumns {
            status: state.status().as_str().to_string(),
            ..Default::default()
        };
        match state {
            TaskState::Pending | TaskState::Processing => {}
            TaskState::Completed { output: TaskOutput::Audio { output_url } } => {
                columns.output_kind = Some(OUTPUT_AUDIO.to_string());
                columns.output_url = Some(output_url.clone());
            }
            TaskState::Completed { output: TaskOutput::Transcript { transcript } } => {
                columns.output_kind = Some(OUTPUT_TRANSCRIPT.to_string());
                if let Some(transcript) = transcript {
                    columns.transcript_text = Some(transcript.transcript_text.clone());
                    columns.transcript_json = Some(serde_json::to_string(transcript)?);
                }
            }
            TaskState::Failed { message } => {
                columns.error_message = Some(message.clone());
            }
        }
        Ok(columns)
    }
}

impl TryFrom<&Task> for TaskModel {
    type Error = StorageError;

    fn try_from(task: &Task) -> Result<Self, Self::Error> {
        let state = StateColumns::try_from(&task.state)?;
        let (input_text, input_url, language, voice) = match &task.input {
            TaskInput::SpeechToText { source_url, language } => {
                (None, Some(source_url.clone()), language.clone(), None)
            }
            TaskInput::TextToSpeech { text, voice } => {
                (Some(text.clone()), None, None, voice.clone())
            }
        };

        Ok(TaskModel {
            id: task.id.clone(),
            owner_id: task.owner_id.clone(),
            task_type: task.task_type().as_str().to_string(),
            status: state.status,
            input_text,
            input_url,
            language,
            voice,
            output_url: state.output_url,
            output_kind: state.output_kind,
            transcript_text: state.transcript_text,
            transcript_json: state.transcript_json,
            error_message: state.error_message,
            created_at: format_timestamp(&task.created_at),
            updated_at: format_timestamp(&task.updated_at),
        })
    }
}

impl TryFrom<TaskModel> for Task {
    type Error = StorageError;

    fn try_from(model: TaskModel) -> Result<Self, Self::Error> {
        let id = model.id.clone();
        let corrupt = |reason: String| StorageError::Corrupt {
            id: id.clone(),
            reason,
        };

        let task_type: TaskType = model.task_type.parse().map_err(corrupt)?;
        let input = match task_type {
            TaskType::SpeechToText => TaskInput::SpeechToText {
                source_url: model
                    .input_url
                    .ok_or_else(|| corrupt("speech_to_text task without input_url".into()))?,
                language: model.language,
            },
            TaskType::TextToSpeech => TaskInput::TextToSpeech {
                text: model
                    .input_text
                    .ok_or_else(|| corrupt("text_to_speech task without input_text".into()))?,
                voice: model.voice,
            },
        };

        let status: TaskStatus = model.status.parse().map_err(corrupt)?;
        let state = match status {
            TaskStatus::Pending => TaskState::Pending,
            TaskStatus::Processing => TaskState::Processing,
            TaskStatus::Failed => TaskState::Failed {
                message: model
                    .error_message
                    .ok_or_else(|| corrupt("failed task without error_message".into()))?,
            },
            TaskStatus::Completed => {
                let kind = model.output_kind.as_deref().unwrap_or(match task_type {
                    TaskType::SpeechToText => OUTPUT_TRANSCRIPT,
                    TaskType::TextToSpeech => OUTPUT_AUDIO,
                });
                let output = match kind {
                    OUTPUT_AUDIO => TaskOutput::Audio {
                        output_url: model
                            .output_url
                            .ok_or_else(|| corrupt("completed audio task without output_url".into()))?,
                    },
                    OUTPUT_TRANSCRIPT => TaskOutput::Transcript {
                        transcript: model
                            .transcript_json
                            .map(|raw| serde_json::from_str::<SimpleTranscript>(&raw))
                            .transpose()?,
                    },
                    other => return Err(corrupt(format!("unknown output kind {}", other))),
                };
                TaskState::Completed { output }
            }
        };

        Ok(Task {
            created_at: parse_timestamp(&model.id, &model.created_at)?,
            updated_at: parse_timestamp(&model.id, &model.updated_at)?,
            id: model.id,
            owner_id: model.owner_id,
            input,
            state,
        })
    }
}
