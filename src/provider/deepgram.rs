use std::fmt;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::retry::{with_retry, RetryPolicy};
use super::{
    ensure_success, redact, ProviderError, ProviderKind, ProviderTranscript, SpeechToText,
    SynthesizedAudio, TextToSpeech,
};

pub const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com";

#[derive(Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    pub base_url: String,
    pub stt_model: String,
    /// Default voice, Deepgram names voices by model id.
    pub tts_model: String,
    /// Used when a task carries no language hint.
    pub language: String,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEEPGRAM_BASE_URL.to_string(),
            stt_model: "nova-3".to_string(),
            tts_model: "aura-2-thalia-en".to_string(),
            language: "en-US".to_string(),
        }
    }
}

impl fmt::Debug for DeepgramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepgramConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("stt_model", &self.stt_model)
            .field("tts_model", &self.tts_model)
            .field("language", &self.language)
            .finish()
    }
}

/// Deepgram `/v1/listen` and `/v1/speak` client.
#[derive(Debug, Clone)]
pub struct DeepgramClient {
    http: reqwest::Client,
    config: DeepgramConfig,
    retry: RetryPolicy,
}

impl DeepgramClient {
    pub fn new(config: DeepgramConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "deepgram api key is not configured".to_string(),
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

    fn auth_header(&self) -> String {
        format!("Token {}", self.config.api_key)
    }

    async fn listen_once(&self, url: &str, language: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(self.endpoint("/v1/listen"))
            .header(AUTHORIZATION, self.auth_header())
            .query(&[
                ("model", self.config.stt_model.as_str()),
                ("punctuate", "true"),
                ("diarize", "true"),
                ("utterances", "true"),
                ("smart_format", "true"),
                ("language", language),
            ])
            .json(&json!({ "url": url }))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn speak_once(&self, text: &str, model: &str) -> Result<SynthesizedAudio, ProviderError> {
        let response = self
            .http
            .post(self.endpoint("/v1/speak"))
            .header(AUTHORIZATION, self.auth_header())
            .query(&[("model", model)])
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = response.bytes().await?.to_vec();

        Ok(SynthesizedAudio { data, content_type })
    }
}

#[async_trait]
impl SpeechToText for DeepgramClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Deepgram
    }

    async fn transcribe_from_url(
        &self,
        url: &str,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProviderTranscript, ProviderError> {
        let language = language.unwrap_or(&self.config.language);
        info!("Requesting deepgram transcription for {} ({})", url, language);

        let body = with_retry(&self.retry, cancel, "deepgram listen", |_| {
            self.listen_once(url, language)
        })
        .await?;

        Ok(ProviderTranscript {
            provider: ProviderKind::Deepgram,
            body,
        })
    }
}

#[async_trait]
impl TextToSpeech for DeepgramClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Deepgram
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let model = voice.unwrap_or(&self.config.tts_model);
        info!("Requesting deepgram speech ({} chars, model {})", text.chars().count(), model);

        with_retry(&self.retry, cancel, "deepgram speak", |_| {
            self.speak_once(text, model)
        })
        .await
    }
}
