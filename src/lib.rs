pub mod config;
pub mod provider;
pub mod schedule;
pub mod storage;
pub mod transcript;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use config::AppConfig;
use provider::{DeepgramClient, OpenAiClient, ProviderKind, SpeechToText, TextToSpeech};
use schedule::TaskManager;
use storage::asset::SqliteAssetStorage;
use storage::object::LocalObjectStorage;
use storage::task::SqliteTaskStorage;

pub struct AppContext {
    pub config: AppConfig,
    pub task_manager: Arc<TaskManager>,
}

impl AppContext {
    /// Wire sqlite stores, the local object store and the configured provider
    /// into a task manager.
    pub async fn build(config: AppConfig) -> Result<Self> {
        Self::assemble(config, true).await
    }

    /// Task store only. Reading and cancelling work without provider
    /// credentials; submissions are rejected since no processor is registered.
    pub async fn open(config: AppConfig) -> Result<Self> {
        Self::assemble(config, false).await
    }

    async fn assemble(config: AppConfig, with_providers: bool) -> Result<Self> {
        info!("Initializing Storage...");
        let tasks = SqliteTaskStorage::new(&config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", config.database_url))?;
        if !with_providers {
            return Ok(Self {
                task_manager: Arc::new(TaskManager::new(Arc::new(tasks))),
                config,
            });
        }

        let assets = SqliteAssetStorage::with_pool(tasks.pool().clone())
            .await
            .context("failed to prepare asset table")?;
        let objects =
            LocalObjectStorage::new(config.object_path.clone(), config.object_base_url.clone());

        info!("Initializing {} provider...", config.provider);
        let (stt, tts) = providers(&config)?;

        info!("Initializing Task Manager...");
        let task_manager = schedule::create_task_manager(
            Arc::new(tasks),
            Arc::new(assets),
            Arc::new(objects),
            stt,
            tts,
        );

        Ok(Self {
            config,
            task_manager: Arc::new(task_manager),
        })
    }
}

type Providers = (Arc<dyn SpeechToText>, Arc<dyn TextToSpeech>);

fn providers(config: &AppConfig) -> Result<Providers> {
    match config.provider {
        ProviderKind::Deepgram => {
            let client = Arc::new(DeepgramClient::new(
                config.deepgram.clone(),
                config.retry.clone(),
            )?);
            let stt: Arc<dyn SpeechToText> = client.clone();
            let tts: Arc<dyn TextToSpeech> = client;
            Ok((stt, tts))
        }
        ProviderKind::OpenAi => {
            let client = Arc::new(OpenAiClient::new(config.openai.clone(), config.retry.clone())?);
            let stt: Arc<dyn SpeechToText> = client.clone();
            let tts: Arc<dyn TextToSpeech> = client;
            Ok((stt, tts))
        }
    }
}
