use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::provider::deepgram::DeepgramConfig;
use crate::provider::{
    DeepgramClient, ProviderError, ProviderKind, ProviderTranscript, RetryPolicy, SynthesizedAudio,
};
use crate::storage::asset::{InMemoryAssetStorage, NewAsset};
use crate::storage::object::InMemoryObjectStorage;
use crate::storage::task::{InMemoryTaskStorage, TaskQuery};
use crate::storage::{StorageError, StorageResult};
use crate::schedule::types::TaskOutcome;

const AUDIO_URL: &str = "https://example/a.mp3";

type SttScript = Box<dyn Fn() -> Result<Value, ProviderError> + Send + Sync>;
type TtsScript = Box<dyn Fn() -> Result<SynthesizedAudio, ProviderError> + Send + Sync>;

/// Speech-to-text provider answering from a script, optionally held back
/// until the test releases it.
struct FakeStt {
    script: SttScript,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    languages: Mutex<Vec<Option<String>>>,
}

impl FakeStt {
    fn new(script: impl Fn() -> Result<Value, ProviderError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            gate: None,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Deepgram
    }

    async fn transcribe_from_url(
        &self,
        _url: &str,
        language: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<ProviderTranscript, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages
            .lock()
            .unwrap()
            .push(language.map(str::to_string));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.script)().map(|body| ProviderTranscript {
            provider: ProviderKind::Deepgram,
            body,
        })
    }
}

struct FakeTts {
    script: TtsScript,
    calls: AtomicUsize,
}

impl FakeTts {
    fn new(
        script: impl Fn() -> Result<SynthesizedAudio, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    fn mp3() -> Self {
        Self::new(|| {
            Ok(SynthesizedAudio {
                data: vec![0x49, 0x44, 0x33, 0x04],
                content_type: "audio/mpeg".to_string(),
            })
        })
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Deepgram
    }

    async fn synthesize(
        &self,
        _text: &str,
        _voice: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<SynthesizedAudio, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)()
    }
}

/// Task storage whose writes can be switched to fail.
#[derive(Default)]
struct FlakyTaskStorage {
    inner: InMemoryTaskStorage,
    fail_create: AtomicBool,
    fail_result: AtomicBool,
}

impl FlakyTaskStorage {
    fn down() -> StorageError {
        StorageError::Unavailable("database is down".to_string())
    }
}

#[async_trait]
impl TaskStorage for FlakyTaskStorage {
    async fn create(&self, task: &Task) -> StorageResult<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.create(task).await
    }

    async fn get(&self, task_id: &str) -> StorageResult<Option<Task>> {
        self.inner.get(task_id).await
    }

    async fn list(&self, query: &TaskQuery) -> StorageResult<(Vec<Task>, u64)> {
        self.inner.list(query).await
    }

    async fn mark_processing(&self, task_id: &str) -> StorageResult<Task> {
        self.inner.mark_processing(task_id).await
    }

    async fn update_result(&self, task_id: &str, outcome: &TaskOutcome) -> StorageResult<Task> {
        if self.fail_result.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.update_result(task_id, outcome).await
    }
}

struct Harness {
    manager: TaskManager,
    assets: Arc<InMemoryAssetStorage>,
    objects: Arc<InMemoryObjectStorage>,
    stt: Arc<FakeStt>,
    tts: Arc<FakeTts>,
}

fn setup_with(storage: Arc<dyn TaskStorage>, stt: FakeStt, tts: FakeTts) -> Harness {
    let assets = Arc::new(InMemoryAssetStorage::new());
    let objects = Arc::new(InMemoryObjectStorage::new("https://objects.example.com"));
    let stt = Arc::new(stt);
    let tts = Arc::new(tts);
    let manager = create_task_manager(
        storage,
        assets.clone(),
        objects.clone(),
        stt.clone(),
        tts.clone(),
    );
    Harness {
        manager,
        assets,
        objects,
        stt,
        tts,
    }
}

fn setup(stt: FakeStt) -> Harness {
    setup_with(Arc::new(InMemoryTaskStorage::new()), stt, FakeTts::mp3())
}

fn hello_world() -> Value {
    json!({
        "results": {
            "channels": [{
                "alternatives": [{ "transcript": "hello world" }]
            }],
            "utterances": [{
                "start": 0.0,
                "end": 0.9,
                "transcript": "hello world",
                "words": [
                    { "word": "hello", "start": 0.0, "end": 0.4 },
                    { "word": "world", "start": 0.5, "end": 0.9 }
                ]
            }]
        }
    })
}

fn silence() -> Value {
    json!({
        "results": {
            "channels": [{ "alternatives": [{ "transcript": "", "words": [] }] }],
            "utterances": []
        }
    })
}

async fn wait_for_terminal(manager: &TaskManager, task_id: &str) -> Result<Task> {
    for _ in 0..500 {
        let task = manager.get_by_id(task_id).await?;
        if task.state.is_terminal() {
            return Ok(task);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("task {} did not finish in time", task_id)
}

async fn wait_for_status(manager: &TaskManager, task_id: &str, status: TaskStatus) -> Result<()> {
    for _ in 0..500 {
        if manager.get_by_id(task_id).await?.status() == status {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("task {} never reached {}", task_id, status)
}

#[tokio::test]
async fn test_submit_returns_pending_task_immediately() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let h = setup(FakeStt::new(|| Ok(hello_world())).gated(gate));

    let task = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL).with_owner("user-1"))
        .await?;
    assert_eq!(task.state, TaskState::Pending);
    assert!(task.id.starts_with("task-"));
    assert_eq!(task.owner_id.as_deref(), Some("user-1"));

    let stored = h.manager.get_by_id(&task.id).await?;
    assert_eq!(stored.id, task.id);
    assert_eq!(stored.input, task.input);
    assert!(!stored.state.is_terminal());

    let other = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL).with_owner("user-1"))
        .await?;
    assert_ne!(task.id, other.id);
    Ok(())
}

#[tokio::test]
async fn test_invalid_requests_create_no_task() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));

    let requests = vec![
        SubmitRequest {
            task_type: "text_to_speech".into(),
            ..Default::default()
        },
        SubmitRequest::text_to_speech("   "),
        SubmitRequest {
            task_type: "speech_to_text".into(),
            input_text: Some("not a url".into()),
            ..Default::default()
        },
        SubmitRequest {
            task_type: "translate".into(),
            input_text: Some("hola".into()),
            ..Default::default()
        },
    ];
    for request in requests {
        let err = h.manager.submit(request).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)), "got {:?}", err);
    }

    let page = h
        .manager
        .list_by_owner(None, Pagination::default(), TaskFilter::default())
        .await?;
    assert_eq!(page.total, 0);
    assert_eq!(h.stt.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_processor_is_a_validation_error() -> Result<()> {
    let manager = TaskManager::new(Arc::new(InMemoryTaskStorage::new()));
    let err = manager
        .submit(SubmitRequest::text_to_speech("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Validation(msg) if msg.contains("text_to_speech")));
    Ok(())
}

#[tokio::test]
async fn test_speech_to_text_end_to_end() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));

    let task = h
        .manager
        .submit(
            SubmitRequest::speech_to_text(AUDIO_URL)
                .with_owner("user-1")
                .with_language("en"),
        )
        .await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;

    let transcript = match done.output() {
        Some(TaskOutput::Transcript {
            transcript: Some(transcript),
        }) => transcript.clone(),
        other => panic!("unexpected output {:?}", other),
    };
    assert_eq!(transcript.transcript_text, "hello world");
    assert_eq!(transcript.words.len(), 2);
    assert_eq!(transcript.words[0].word, "hello");
    assert_eq!((transcript.words[0].start, transcript.words[0].end), (0.0, 0.4));
    assert_eq!(transcript.words[1].word, "world");
    assert_eq!(transcript.utterances.len(), 1);
    assert!(done.updated_at >= done.created_at);

    assert_eq!(
        h.stt.languages.lock().unwrap().as_slice(),
        &[Some("en".to_string())]
    );

    // asset registration follows the committed result
    h.manager.shutdown().await;
    let assets = h.assets.all()?;
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].location, AUDIO_URL);
    assert_eq!(assets[0].owner_id.as_deref(), Some("user-1"));
    assert_eq!(assets[0].display_name, "a.mp3");
    assert_eq!(assets[0].description, None);
    Ok(())
}

#[tokio::test]
async fn test_speech_to_text_reuses_existing_asset() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));
    h.assets
        .create_asset(NewAsset {
            owner_id: Some("user-1".into()),
            location: AUDIO_URL.into(),
            display_name: "uploaded".into(),
            description: None,
        })
        .await?;

    let task = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL).with_owner("user-1"))
        .await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;
    assert_eq!(done.status(), TaskStatus::Completed);

    h.manager.shutdown().await;
    let assets = h.assets.all()?;
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].display_name, "uploaded");
    Ok(())
}

#[tokio::test]
async fn test_no_speech_completes_with_null_transcript() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(silence())));

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;

    assert_eq!(
        done.state,
        TaskState::Completed {
            output: TaskOutput::Transcript { transcript: None }
        }
    );
    // system task, no owner on the asset either
    h.manager.shutdown().await;
    let assets = h.assets.all()?;
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].owner_id, None);
    Ok(())
}

#[tokio::test]
async fn test_unusable_transcript_fails_task() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(json!({ "results": { "channels": [] } }))));

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;

    assert_eq!(done.status(), TaskStatus::Failed);
    assert!(done.error_message().unwrap().contains("no utterances"));
    assert!(h.assets.all()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exhausted_provider_fails_task() -> Result<()> {
    let h = setup(FakeStt::new(|| {
        Err(ProviderError::Exhausted {
            attempts: 3,
            last: Box::new(ProviderError::Transient {
                message: "bad gateway".into(),
                status: Some(502),
            }),
        })
    }));

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;

    let message = done.error_message().unwrap();
    assert!(message.contains("3 attempts"), "{}", message);
    assert!(message.contains("bad gateway"), "{}", message);
    Ok(())
}

#[tokio::test]
async fn test_text_to_speech_end_to_end() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));

    let task = h
        .manager
        .submit(SubmitRequest::text_to_speech("Good morning").with_owner("user-1"))
        .await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;

    let output_url = match done.output() {
        Some(TaskOutput::Audio { output_url }) => output_url.clone(),
        other => panic!("unexpected output {:?}", other),
    };
    assert!(output_url.starts_with("https://objects.example.com/text-to-speech/user-1/"));
    assert!(output_url.ends_with(".mp3"));

    let keys = h.objects.keys()?;
    assert_eq!(keys.len(), 1);
    let stored = h.objects.get(&keys[0])?.unwrap();
    assert_eq!(stored.content_type, "audio/mpeg");
    assert_eq!(stored.data, vec![0x49, 0x44, 0x33, 0x04]);

    let assets = h.assets.all()?;
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].location, output_url);
    assert_eq!(assets[0].display_name, "deepgram-tts.mp3");
    assert_eq!(assets[0].description.as_deref(), Some("Good morning"));
    Ok(())
}

#[tokio::test]
async fn test_repeated_synthesis_creates_separate_assets() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));

    let first = h.manager.submit(SubmitRequest::text_to_speech("again")).await?;
    let second = h.manager.submit(SubmitRequest::text_to_speech("again")).await?;
    wait_for_terminal(&h.manager, &first.id).await?;
    wait_for_terminal(&h.manager, &second.id).await?;

    assert_eq!(h.tts.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.objects.keys()?.len(), 2);
    assert_eq!(h.assets.all()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rejected_synthesis_fails_task() -> Result<()> {
    let h = setup_with(
        Arc::new(InMemoryTaskStorage::new()),
        FakeStt::new(|| Ok(hello_world())),
        FakeTts::new(|| {
            Err(ProviderError::Rejected {
                status: 400,
                body: "unknown voice".into(),
            })
        }),
    );

    let task = h
        .manager
        .submit(SubmitRequest::text_to_speech("hi").with_voice("nobody"))
        .await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;

    let message = done.error_message().unwrap();
    assert!(message.contains("400"), "{}", message);
    assert!(message.contains("unknown voice"), "{}", message);
    assert!(h.objects.keys()?.is_empty());
    assert!(h.assets.all()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_wins_over_late_completion() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let h = setup(FakeStt::new(|| Ok(hello_world())).gated(gate.clone()));

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    wait_for_status(&h.manager, &task.id, TaskStatus::Processing).await?;

    let cancelled = h.manager.cancel(&task.id, Some("user asked")).await?;
    assert_eq!(cancelled.error_message(), Some("user asked"));

    // let the provider answer, then wait for the worker to finish
    gate.notify_one();
    h.manager.shutdown().await;

    let stored = h.manager.get_by_id(&task.id).await?;
    assert_eq!(stored.error_message(), Some("user asked"));
    assert_eq!(h.stt.calls(), 1);
    assert_eq!(h.manager.stuck_writes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_transcription_registers_no_asset() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let h = setup(FakeStt::new(|| Ok(hello_world())).gated(gate.clone()));

    let task = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL).with_owner("user-1"))
        .await?;
    wait_for_status(&h.manager, &task.id, TaskStatus::Processing).await?;
    h.manager.cancel(&task.id, Some("stop")).await?;

    gate.notify_one();
    h.manager.shutdown().await;

    let stored = h.manager.get_by_id(&task.id).await?;
    assert_eq!(stored.status(), TaskStatus::Failed);
    assert_eq!(stored.error_message(), Some("stop"));
    assert_eq!(h.stt.calls(), 1);
    assert!(h.assets.all()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_errors() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));

    let err = h.manager.cancel("task-missing", None).await.unwrap_err();
    assert!(matches!(err, TaskError::NotFound(id) if id == "task-missing"));

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    let done = wait_for_terminal(&h.manager, &task.id).await?;
    assert_eq!(done.status(), TaskStatus::Completed);

    let err = h.manager.cancel(&task.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        TaskError::AlreadyTerminal {
            status: TaskStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.manager.get_by_id(&task.id).await?.state, done.state);
    Ok(())
}

#[tokio::test]
async fn test_cancel_uses_default_message() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let h = setup(FakeStt::new(|| Ok(hello_world())).gated(gate));

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    let cancelled = h.manager.cancel(&task.id, Some("  ")).await?;
    assert_eq!(cancelled.error_message(), Some("cancelled by request"));
    Ok(())
}

#[tokio::test]
async fn test_get_unknown_task() {
    let h = setup(FakeStt::new(|| Ok(hello_world())));
    let err = h.manager.get_by_id("task-nope").await.unwrap_err();
    assert!(matches!(err, TaskError::NotFound(_)));
}

#[tokio::test]
async fn test_list_by_owner_pages_and_clamps() -> Result<()> {
    let storage = Arc::new(InMemoryTaskStorage::new());
    let h = setup_with(storage.clone(), FakeStt::new(|| Ok(hello_world())), FakeTts::mp3());

    let base = chrono::Utc::now();
    for i in 0..45 {
        let at = base + chrono::Duration::seconds(i);
        storage
            .create(&Task {
                id: format!("task-{}", i),
                owner_id: Some("user-1".into()),
                input: TaskInput::TextToSpeech {
                    text: format!("line {}", i),
                    voice: None,
                },
                state: TaskState::Pending,
                created_at: at,
                updated_at: at,
            })
            .await?;
    }

    let page = h
        .manager
        .list_by_owner(Some("user-1"), Pagination::default(), TaskFilter::default())
        .await?;
    assert_eq!(page.tasks.len(), 20);
    assert_eq!(page.total, 45);
    assert_eq!((page.page, page.total_pages), (1, 3));
    assert_eq!(page.tasks[0].id, "task-44");

    let last = h
        .manager
        .list_by_owner(Some("user-1"), Pagination::new(20, 40), TaskFilter::default())
        .await?;
    assert_eq!(last.tasks.len(), 5);
    assert_eq!(last.page, 3);

    let clamped = h
        .manager
        .list_by_owner(Some("user-1"), Pagination::new(500, 0), TaskFilter::default())
        .await?;
    assert_eq!(clamped.limit, 100);
    assert_eq!(clamped.tasks.len(), 45);

    for bad in [Pagination::new(0, 0), Pagination::new(10, -1)] {
        let err = h
            .manager
            .list_by_owner(Some("user-1"), bad, TaskFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    let nobody = h
        .manager
        .list_by_owner(Some("user-2"), Pagination::default(), TaskFilter::default())
        .await?;
    assert_eq!(nobody.total, 0);
    Ok(())
}

#[tokio::test]
async fn test_list_by_owner_filters_status() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));

    let ok = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL).with_owner("user-1"))
        .await?;
    wait_for_terminal(&h.manager, &ok.id).await?;
    let tts = h
        .manager
        .submit(SubmitRequest::text_to_speech("hi").with_owner("user-1"))
        .await?;
    wait_for_terminal(&h.manager, &tts.id).await?;

    let stt_only = h
        .manager
        .list_by_owner(
            Some("user-1"),
            Pagination::default(),
            TaskFilter {
                task_type: Some(TaskType::SpeechToText),
                status: Some(TaskStatus::Completed),
            },
        )
        .await?;
    assert_eq!(stt_only.total, 1);
    assert_eq!(stt_only.tasks[0].id, ok.id);
    Ok(())
}

#[tokio::test]
async fn test_submit_surfaces_persistence_failure() -> Result<()> {
    let storage = Arc::new(FlakyTaskStorage::default());
    storage.fail_create.store(true, Ordering::SeqCst);
    let h = setup_with(storage, FakeStt::new(|| Ok(hello_world())), FakeTts::mp3());

    let err = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Persistence(_)));

    h.manager.shutdown().await;
    assert_eq!(h.stt.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_terminal_write_is_reported() -> Result<()> {
    let storage = Arc::new(FlakyTaskStorage::default());
    storage.fail_result.store(true, Ordering::SeqCst);
    let h = setup_with(storage, FakeStt::new(|| Ok(hello_world())), FakeTts::mp3());
    let mut events = h.manager.subscribe();

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    h.manager.shutdown().await;

    assert_eq!(h.manager.stuck_writes(), 1);
    assert_eq!(h.manager.get_by_id(&task.id).await?.status(), TaskStatus::Processing);

    let mut saw_stuck = false;
    while let Ok(event) = events.try_recv() {
        if let TaskEvent::Stuck { task_id, error } = event {
            assert_eq!(task_id, task.id);
            assert!(error.contains("database is down"));
            saw_stuck = true;
        }
    }
    assert!(saw_stuck);
    Ok(())
}

#[tokio::test]
async fn test_events_follow_lifecycle() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));
    let mut events = h.manager.subscribe();

    let task = h.manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;

    let started = tokio::time::timeout(Duration::from_secs(5), events.recv()).await??;
    assert!(matches!(started, TaskEvent::Started { ref task_id } if *task_id == task.id));
    let finished = tokio::time::timeout(Duration::from_secs(5), events.recv()).await??;
    match finished {
        TaskEvent::Completed { task: done } => {
            assert_eq!(done.id, task.id);
            assert_eq!(done.status(), TaskStatus::Completed);
        }
        other => panic!("unexpected event {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_shutdown_rejects_new_tasks() -> Result<()> {
    let h = setup(FakeStt::new(|| Ok(hello_world())));
    h.manager.shutdown().await;

    let err = h
        .manager
        .submit(SubmitRequest::speech_to_text(AUDIO_URL))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::ShuttingDown));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_aborts_provider_backoff() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = Arc::new(DeepgramClient::new(
        DeepgramConfig {
            api_key: "dg-test-key".into(),
            base_url: server.uri(),
            ..Default::default()
        },
        RetryPolicy::default().with_base_delay(Duration::from_secs(60)),
    )?);
    let assets = Arc::new(InMemoryAssetStorage::new());
    let manager = create_task_manager(
        Arc::new(InMemoryTaskStorage::new()),
        assets.clone(),
        Arc::new(InMemoryObjectStorage::new("https://objects.example.com")),
        client.clone(),
        client,
    );

    let task = manager.submit(SubmitRequest::speech_to_text(AUDIO_URL)).await?;
    for _ in 0..500 {
        if !server.received_requests().await.unwrap_or_default().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::timeout(Duration::from_secs(5), manager.shutdown()).await?;

    let done = manager.get_by_id(&task.id).await?;
    assert_eq!(done.error_message(), Some("provider call cancelled"));
    assert!(assets.all()?.is_empty());
    Ok(())
}
