#![allow(clippy::uninlined_format_args)]

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use speech_rs::config::init_env;
use speech_rs::schedule::{
    Pagination, SubmitRequest, Task, TaskFilter, TaskManager, TaskStatus, TaskType,
};
use speech_rs::utils::logger;
use speech_rs::AppContext;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Submit and inspect speech tasks
#[derive(Parser)]
#[command(
    name = "speech-rs",
    version = env!("CARGO_PKG_VERSION"),
    about = "Speech-to-text and text-to-speech task runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe audio at a URL and wait for the transcript
    Stt {
        /// Publicly reachable audio URL
        url: String,

        #[arg(short, long)]
        owner: Option<String>,

        /// Language hint, e.g. en-US
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Synthesize text and wait for the audio URL
    Tts {
        text: String,

        #[arg(short, long)]
        owner: Option<String>,

        #[arg(short, long)]
        voice: Option<String>,
    },
    /// Show one task
    Get {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// List tasks of an owner, system tasks when no owner is given
    List {
        #[arg(short, long)]
        owner: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,

        /// speech_to_text or text_to_speech
        #[arg(long)]
        task_type: Option<TaskType>,

        /// pending, processing, completed or failed
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Fail a task that has not finished yet
    Cancel {
        #[arg(value_name = "TASK_ID")]
        id: String,

        #[arg(short, long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = init_env()?;
    let _guard = logger::init(config.log_dir.clone())?;
    info!("Starting speech-rs...");
    info!(
        "Using {} provider, objects under {}",
        config.provider,
        config.object_path.display()
    );

    // only submissions reach a provider
    let ctx = match cli.command {
        Commands::Stt { .. } | Commands::Tts { .. } => AppContext::build(config).await?,
        _ => AppContext::open(config).await?,
    };
    let manager = ctx.task_manager.clone();

    let result = run(&manager, cli.command).await;
    manager.shutdown().await;
    result
}

async fn run(manager: &TaskManager, command: Commands) -> Result<()> {
    match command {
        Commands::Stt {
            url,
            owner,
            language,
        } => {
            let mut request = SubmitRequest::speech_to_text(url);
            request.owner_id = owner;
            request.language = language;
            submit_and_wait(manager, request).await
        }
        Commands::Tts { text, owner, voice } => {
            let mut request = SubmitRequest::text_to_speech(text);
            request.owner_id = owner;
            request.voice = voice;
            submit_and_wait(manager, request).await
        }
        Commands::Get { id } => print_json(&manager.get_by_id(&id).await?),
        Commands::List {
            owner,
            limit,
            offset,
            task_type,
            status,
        } => {
            let page = manager
                .list_by_owner(
                    owner.as_deref(),
                    Pagination::new(limit, offset),
                    TaskFilter { task_type, status },
                )
                .await?;
            print_json(&page)
        }
        Commands::Cancel { id, message } => {
            print_json(&manager.cancel(&id, message.as_deref()).await?)
        }
    }
}

async fn submit_and_wait(manager: &TaskManager, request: SubmitRequest) -> Result<()> {
    let task = manager.submit(request).await?;
    info!("Submitted task {}", task.id);

    let task = tokio::select! {
        task = wait_for_terminal(manager, &task.id) => task?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling task {}", task.id);
            manager.cancel(&task.id, Some("interrupted")).await?
        }
    };
    print_json(&task)
}

async fn wait_for_terminal(manager: &TaskManager, task_id: &str) -> Result<Task> {
    loop {
        let task = manager.get_by_id(task_id).await?;
        if task.state.is_terminal() {
            return Ok(task);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
