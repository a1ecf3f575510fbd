use std::fmt;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::retry::{with_retry, RetryPolicy};
use super::{
    ensure_success, redact, ProviderError, ProviderKind, ProviderTranscript, SpeechToText,
    SynthesizedAudio, TextToSpeech,
};
use crate::utils::http::{download_audio, DownloadedAudio};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub stt_model: String,
    pub tts_model: String,
    pub voice: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("stt_model", &self.stt_model)
            .field("tts_model", &self.tts_model)
            .field("voice", &self.voice)
            .finish()
    }
}

/// Client for OpenAI-compatible `/v1/audio` endpoints (Whisper STT, TTS).
///
/// The transcription endpoint only takes uploads, so the source URL is
/// downloaded first. Download and upload are retried independently.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "openai api key is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(retry.attempt_timeout)
            .build()?;
        Ok(Self { http, config, retry })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn transcribe_once(
        &self,
        audio: &DownloadedAudio,
        language: Option<&str>,
    ) -> Result<Value, ProviderError> {
        let part = Part::bytes(audio.data.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.content_type)
            .map_err(|e| ProviderError::Configuration(format!("invalid mime type: {}", e)))?;
        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.stt_model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("timestamp_granularities[]", "segment");
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .http
            .post(self.endpoint("/v1/audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn speech_once(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, ProviderError> {
        let response = self
            .http
            .post(self.endpoint("/v1/audio/speech"))
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.tts_model,
                "input": text,
                "voice": voice,
                "response_format": "mp3",
            }))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let data = response.bytes().await?.to_vec();

        Ok(SynthesizedAudio { data, content_type })
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn transcribe_from_url(
        &self,
        url: &str,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProviderTranscript, ProviderError> {
        let audio = with_retry(&self.retry, cancel, "source download", |_| {
            download_audio(&self.http, url)
        })
        .await?;

        info!(
            "Requesting whisper transcription for {} ({} bytes)",
            audio.file_name,
            audio.data.len()
        );
        let body = with_retry(&self.retry, cancel, "whisper transcription", |_| {
            self.transcribe_once(&audio, language)
        })
        .await?;

        Ok(ProviderTranscript {
            provider: ProviderKind::OpenAi,
            body,
        })
    }
}

#[async_trait]
impl TextToSpeech for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let voice = voice.unwrap_or(&self.config.voice);
        info!("Requesting openai speech ({} chars, voice {})", text.chars().count(), voice);

        with_retry(&self.retry, cancel, "openai speech", |_| {
            self.speech_once(text, voice)
        })
        .await
    }
}
