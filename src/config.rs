use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::provider::deepgram::DeepgramConfig;
use crate::provider::openai::OpenAiConfig;
use crate::provider::{Backoff, ProviderKind, RetryPolicy};

const SPEECH_DATABASE_URL: &str = "sqlite://./speech_data/database/storage.db?mode=rwc";
const SPEECH_OBJECT_PATH: &str = "./speech_data/objects";
const SPEECH_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub object_path: PathBuf,
    /// Public prefix for stored objects, `file://` URLs are returned without it.
    pub object_base_url: Option<String>,
    pub log_dir: String,
    pub provider: ProviderKind,
    pub deepgram: DeepgramConfig,
    pub openai: OpenAiConfig,
    pub retry: RetryPolicy,
}

/// Process environment first, `.env` second.
fn env_or_dotenv(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => Some(value),
        Err(_) => dotenv::var(key).ok(),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_or_dotenv)
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let provider = match get("SPEECH_PROVIDER") {
            Some(raw) => ProviderKind::from_str(&raw)
                .map_err(anyhow::Error::msg)
                .context("invalid SPEECH_PROVIDER")?,
            None => ProviderKind::Deepgram,
        };

        let mut retry = RetryPolicy::default();
        if let Some(raw) = get("PROVIDER_MAX_ATTEMPTS") {
            let attempts: u32 = raw.trim().parse().context("invalid PROVIDER_MAX_ATTEMPTS")?;
            anyhow::ensure!(attempts > 0, "PROVIDER_MAX_ATTEMPTS must be at least 1");
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(raw) = get("PROVIDER_BACKOFF_MS") {
            let millis: u64 = raw.trim().parse().context("invalid PROVIDER_BACKOFF_MS")?;
            retry = retry.with_base_delay(Duration::from_millis(millis));
        }
        if let Some(raw) = get("PROVIDER_BACKOFF") {
            let backoff = match raw.trim().to_ascii_lowercase().as_str() {
                "linear" => Backoff::Linear,
                "exponential" => Backoff::Exponential,
                other => anyhow::bail!("invalid PROVIDER_BACKOFF: {}", other),
            };
            retry = retry.with_backoff(backoff);
        }
        if let Some(raw) = get("PROVIDER_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().context("invalid PROVIDER_TIMEOUT_SECS")?;
            anyhow::ensure!(secs > 0, "PROVIDER_TIMEOUT_SECS must be at least 1");
            retry = retry.with_attempt_timeout(Duration::from_secs(secs));
        }

        let dg = DeepgramConfig::default();
        let deepgram = DeepgramConfig {
            api_key: get_or("DEEPGRAM_API_KEY", ""),
            base_url: get_or("DEEPGRAM_BASE_URL", &dg.base_url),
            stt_model: get_or("DEEPGRAM_STT_MODEL", &dg.stt_model),
            tts_model: get_or("DEEPGRAM_TTS_MODEL", &dg.tts_model),
            language: get_or("DEEPGRAM_LANGUAGE", &dg.language),
        };

        let oa = OpenAiConfig::default();
        let openai = OpenAiConfig {
            api_key: get_or("OPENAI_API_KEY", ""),
            base_url: get_or("OPENAI_BASE_URL", &oa.base_url),
            stt_model: get_or("OPENAI_STT_MODEL", &oa.stt_model),
            tts_model: get_or("OPENAI_TTS_MODEL", &oa.tts_model),
            voice: get_or("OPENAI_TTS_VOICE", &oa.voice),
        };

        Ok(Self {
            database_url: get_or("SPEECH_DATABASE_URL", SPEECH_DATABASE_URL),
            object_path: PathBuf::from(get_or("SPEECH_OBJECT_PATH", SPEECH_OBJECT_PATH)),
            object_base_url: get("SPEECH_OBJECT_BASE_URL"),
            log_dir: get_or("SPEECH_LOG_DIR", SPEECH_LOG_DIR),
            provider,
            deepgram,
            openai,
            retry,
        })
    }

    /// Filesystem path of a sqlite url, `None` for in-memory databases.
    pub fn database_path(&self) -> Option<&Path> {
        let rest = self.database_url.strip_prefix("sqlite://")?;
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path.contains(":memory:") {
            return None;
        }
        Some(Path::new(path))
    }
}

/// Load `.env` and make sure the data directories exist.
pub fn init_env() -> Result<AppConfig> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    if let Some(dir) = config.database_path().and_then(Path::parent) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;
    }
    std::fs::create_dir_all(&config.object_path).with_context(|| {
        format!(
            "failed to create object directory {}",
            config.object_path.display()
        )
    })?;
    Ok(config)
}
