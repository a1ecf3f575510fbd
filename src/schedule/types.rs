use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::SimpleTranscript;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SpeechToText,
    TextToSpeech,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SpeechToText => "speech_to_text",
            TaskType::TextToSpeech => "text_to_speech",
        }
    }
}

impl Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speech_to_text" | "stt" => Ok(TaskType::SpeechToText),
            "text_to_speech" | "tts" => Ok(TaskType::TextToSpeech),
            other => Err(format!("invalid task_type: {}", other)),
        }
    }
}

/// Flat view of [`TaskState`], used for filtering and persistence.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("invalid task status: {}", other)),
        }
    }
}

/// What the task was asked to do. The variant is the task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskInput {
    SpeechToText {
        source_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    TextToSpeech {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
    },
}

impl TaskInput {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskInput::SpeechToText { .. } => TaskType::SpeechToText,
            TaskInput::TextToSpeech { .. } => TaskType::TextToSpeech,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    /// Location of the synthesized audio.
    Audio { output_url: String },
    /// `None` means the provider detected no speech.
    Transcript { transcript: Option<SimpleTranscript> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing,
    Completed { output: TaskOutput },
    Failed { message: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Processing => TaskStatus::Processing,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// The only states a terminal write may record.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(TaskOutput),
    Failed(String),
}

impl From<TaskOutcome> for TaskState {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Completed(output) => TaskState::Completed { output },
            TaskOutcome::Failed(message) => TaskState::Failed { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_id: Option<String>,
    pub input: TaskInput,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        self.input.task_type()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        match &self.state {
            TaskState::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Submission as received from an outer caller. Validated into a [`TaskInput`]
/// by the task manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_type: String,
    #[serde(default)]
    pub input_text: Option<String>,
    #[serde(default)]
    pub input_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl SubmitRequest {
    pub fn speech_to_text(source_url: impl Into<String>) -> Self {
        Self {
            task_type: TaskType::SpeechToText.to_string(),
            input_url: Some(source_url.into()),
            ..Default::default()
        }
    }

    pub fn text_to_speech(text: impl Into<String>) -> Self {
        Self {
            task_type: TaskType::TextToSpeech.to_string(),
            input_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Turn the loose request fields into a typed input.
    pub fn into_input(self) -> Result<(TaskInput, Option<String>), String> {
        let task_type = TaskType::from_str(&self.task_type)?;
        let input = match task_type {
            TaskType::TextToSpeech => {
                let text = non_empty(self.input_text)
                    .ok_or_else(|| "input_text is required for text_to_speech".to_string())?;
                TaskInput::TextToSpeech {
                    text,
                    voice: non_empty(self.voice),
                }
            }
            TaskType::SpeechToText => {
                let source_url = non_empty(self.input_url)
                    .ok_or_else(|| "input_url is required for speech_to_text".to_string())?;
                TaskInput::SpeechToText {
                    source_url,
                    language: non_empty(self.language),
                }
            }
        };
        Ok((input, non_empty(self.owner_id)))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub page: u64,
    pub total_pages: u64,
}
