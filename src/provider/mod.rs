pub mod deepgram;
pub mod error;
pub mod openai;
pub mod retry;

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use deepgram::DeepgramClient;
pub use error::ProviderError;
pub use openai::OpenAiClient;
pub use retry::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Deepgram,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Deepgram => "deepgram",
            ProviderKind::OpenAi => "openai",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepgram" => Ok(ProviderKind::Deepgram),
            "openai" | "whisper" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown speech provider: {}", other)),
        }
    }
}

/// Raw STT response body, tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTranscript {
    pub provider: ProviderKind,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl SynthesizedAudio {
    /// File extension for the audio's content type.
    pub fn extension(&self) -> &'static str {
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" | "audio/opus" => "ogg",
            "audio/flac" => "flac",
            "audio/aac" => "aac",
            "audio/webm" => "webm",
            _ => "bin",
        }
    }
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn transcribe_from_url(
        &self,
        url: &str,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProviderTranscript, ProviderError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// `voice` overrides the configured voice/model when set.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedAudio, ProviderError>;
}

/// Pass successful responses through, classify the rest by status.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, body))
}

pub(crate) fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}
