//! End-to-end tests: the engine over the in-memory stores, keyword
//! retrieval and a scripted model.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragloom_config::{EngineConfig, SummaryConfig};
use ragloom_core::error::ProviderError;
use ragloom_core::{
    DocumentNode, FrameReceiver, KnowledgeBase, Message, ModelHandle, Provider, ProviderRequest,
    ProviderResponse, Role, StoredMessage, StreamChunk, Usage,
};
use ragloom_engine::{
    BuildRequest, CancellationToken, ChatChunk, ChunkKind, Collaborators, RagEngine,
};
use ragloom_stores::{InMemoryStore, KeywordRetrieval};
use tokio::sync::mpsc;

/// Streams fixed frames and answers completions from a queue, recording
/// every request it sees.
struct ScriptedModel {
    frames: Vec<StreamChunk>,
    completions: Mutex<Vec<Result<String, ProviderError>>>,
    seen: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedModel {
    fn new(frames: Vec<StreamChunk>, completions: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            frames,
            completions: Mutex::new(completions),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<ProviderRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.seen.lock().unwrap().push(request);
        let mut queue = self.completions.lock().unwrap();
        if queue.is_empty() {
            return Err(ProviderError::NotConfigured("no scripted completion left".into()));
        }
        let text = queue.remove(0)?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model: "scripted".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FrameReceiver, ProviderError> {
        self.seen.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in &self.frames {
            let _ = tx.try_send(Ok(frame.clone()));
        }
        Ok(rx)
    }
}

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .put_knowledge_base(KnowledgeBase {
            id: "kb".into(),
            dataset_id: "ds".into(),
            base_url: "https://wiki.example.com".into(),
        })
        .await;
    for (doc_id, node_id, name) in [
        ("doc-install", "n-install", "Installation"),
        ("doc-backup", "n-backup", "Backups"),
    ] {
        store
            .put_document(
                doc_id,
                DocumentNode {
                    node_id: node_id.into(),
                    name: name.into(),
                    path_names: vec!["Operations".into()],
                    ..DocumentNode::default()
                },
            )
            .await;
    }
    store
}

async fn seeded_index() -> KeywordRetrieval {
    let index = KeywordRetrieval::new();
    index
        .add_chunk("ds", "doc-backup", "Backups run nightly at 02:00.")
        .await;
    index
        .add_chunk("ds", "doc-install", "Install with docker compose up.")
        .await;
    index
        .add_chunk("ds", "doc-backup", "Backups are kept for 30 days.")
        .await;
    index
        .add_chunk("ds", "doc-unreleased", "Backups draft notes.")
        .await;
    index
}

fn engine(store: InMemoryStore, index: KeywordRetrieval, model: Arc<ScriptedModel>) -> RagEngine {
    let collaborators = Collaborators::from_store(Arc::new(store), Arc::new(index));
    RagEngine::new(
        &EngineConfig::default(),
        collaborators,
        ModelHandle::new(model, "scripted-model"),
    )
    .unwrap()
}

fn request(conversation_id: &str) -> BuildRequest {
    BuildRequest {
        conversation_id: conversation_id.into(),
        kb_id: "kb".into(),
        ..BuildRequest::default()
    }
}

#[tokio::test]
async fn chat_turn_retrieves_builds_and_streams() {
    let store = seeded_store().await;
    let conversation = store.create_conversation().await;
    store
        .push_message(&conversation, StoredMessage::new("user", "hello"))
        .await;
    store
        .push_message(&conversation, StoredMessage::new("assistant", "hi, ask away"))
        .await;
    store
        .push_message(&conversation, StoredMessage::new("user", "when do backups run"))
        .await;

    let model = Arc::new(ScriptedModel::new(
        vec![
            StreamChunk::reasoning("Look at the backup doc."),
            StreamChunk::reasoning(" It says nightly."),
            StreamChunk::answer("Backups run"),
            StreamChunk::answer(" nightly.").with_usage(Usage {
                prompt_tokens: 120,
                completion_tokens: 8,
                total_tokens: 128,
            }),
        ],
        vec![],
    ));
    let engine = engine(store, seeded_index().await, model.clone());

    let mut sink: Vec<ChatChunk> = Vec::new();
    let reply = engine
        .chat(request(&conversation), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    let texts: Vec<&str> = sink.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "<think>Look at the backup doc.",
            " It says nightly.",
            "</think>\nBackups run",
            " nightly."
        ]
    );
    assert_eq!(sink[1].kind, ChunkKind::Reasoning);
    assert_eq!(sink[3].kind, ChunkKind::Answer);

    let outcome = reply.outcome.unwrap();
    assert_eq!(outcome.usage.total_tokens, 128);
    assert_eq!(outcome.reasoning_frames, 2);

    // Backups first (first appearance), unreleased draft dropped.
    let names: Vec<&str> = reply
        .ranked
        .bundles
        .iter()
        .map(|b| b.node_name.as_str())
        .collect();
    assert_eq!(names, vec!["Backups"]);
    assert_eq!(reply.ranked.bundles[0].chunks.len(), 2);
    assert_eq!(reply.ranked.unresolved_doc_ids, vec!["doc-unreleased"]);

    let sent = &model.seen()[0];
    assert!(sent.stream);
    let roles: Vec<Role> = sent.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    let user = &sent.messages[3].content;
    assert!(user.contains("Backups run nightly at 02:00."));
    assert!(user.contains("URL: https://wiki.example.com/node/n-backup"));
    assert!(user.contains("Question: when do backups run"));
}

#[tokio::test]
async fn empty_conversation_streams_nothing() {
    let store = seeded_store().await;
    let conversation = store.create_conversation().await;
    let model = Arc::new(ScriptedModel::new(vec![StreamChunk::answer("x")], vec![]));
    let engine = engine(store, seeded_index().await, model.clone());

    let mut sink: Vec<ChatChunk> = Vec::new();
    let reply = engine
        .chat(request(&conversation), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert!(reply.outcome.is_none());
    assert!(reply.ranked.bundles.is_empty());
    assert!(sink.is_empty());
    assert!(model.seen().is_empty());
}

#[tokio::test]
async fn group_filter_reaches_retrieval() {
    let store = seeded_store().await;
    store
        .push_message("c", StoredMessage::new("user", "docker password"))
        .await;
    let index = seeded_index().await;
    index
        .add_restricted_chunk("ds", "doc-install", "Docker password is rotated.", vec![9])
        .await;
    let model = Arc::new(ScriptedModel::new(vec![], vec![]));
    let engine = engine(store, index, model);

    let mut req = request("c");
    req.group_ids = vec![1];
    let built = engine
        .build_context(req, &CancellationToken::new())
        .await
        .unwrap();
    let contents: Vec<&str> = built
        .ranked
        .bundles
        .iter()
        .flat_map(|b| b.chunks.iter().map(|c| c.content.as_str()))
        .collect();
    assert!(!contents.contains(&"Docker password is rotated."));
}

#[tokio::test]
async fn summarize_uses_stored_prompt_and_final_pass() {
    let store = seeded_store().await;
    store.set_summary_prompt("kb", "Summarize for operators.").await;
    let model = Arc::new(ScriptedModel::new(
        vec![],
        vec![
            Ok("<think>reading</think> Nightly backups, 30 day retention.".into()),
            Ok("Backups: nightly, kept 30 days.".into()),
        ],
    ));
    let engine = engine(store, seeded_index().await, model.clone());

    let out = engine
        .summarize(
            "kb",
            "Backups",
            "Backups run nightly. They are kept for 30 days.",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(out.summary, "Backups: nightly, kept 30 days.");
    assert!(!out.degraded);
    let seen = model.seen();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].stream);
    assert_eq!(seen[0].messages[0].content, "Summarize for operators.");
    assert_eq!(
        seen[1].messages[1].content,
        "Document name: Backups\nDocument content: Nightly backups, 30 day retention."
    );
}

#[tokio::test]
async fn summarize_degrades_when_final_pass_fails() {
    let store = seeded_store().await;
    let long = "y".repeat(700);
    let model = Arc::new(ScriptedModel::new(
        vec![],
        vec![Ok(long.clone()), Err(ProviderError::Timeout("60s".into()))],
    ));
    let engine = engine(store, seeded_index().await, model);

    let out = engine
        .summarize("kb", "Big", "some content", &CancellationToken::new())
        .await
        .unwrap();

    assert!(out.degraded);
    assert_eq!(out.summary.chars().count(), 503);
    assert!(out.summary.ends_with("..."));
}

#[tokio::test]
async fn configured_limits_flow_into_the_summarizer() {
    let store = seeded_store().await;
    let model = Arc::new(ScriptedModel::new(
        vec![],
        vec![Ok("a".into()), Ok("b".into()), Ok("final".into())],
    ));
    let config = EngineConfig {
        summary: SummaryConfig {
            chunk_token_limit: 16,
            max_chunks: 2,
            ..SummaryConfig::default()
        },
        ..EngineConfig::default()
    };
    let engine = RagEngine::new(
        &config,
        Collaborators::from_store(Arc::new(store), Arc::new(seeded_index().await)),
        ModelHandle::new(model.clone(), "scripted-model"),
    )
    .unwrap();

    let out = engine
        .summarize("kb", "Long", &"token ".repeat(100), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out.chunks_used, 2);
    assert!(out.chunks_total > 2);
    assert_eq!(out.summary, "final");
    assert_eq!(model.seen().len(), 3);
}

#[tokio::test]
async fn cancelled_chat_is_reported() {
    let store = seeded_store().await;
    store
        .push_message("c", StoredMessage::new("user", "backups"))
        .await;
    let model = Arc::new(ScriptedModel::new(vec![StreamChunk::answer("x")], vec![]));
    let engine = engine(store, seeded_index().await, model.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut sink: Vec<ChatChunk> = Vec::new();
    let err = engine
        .chat(request("c"), &mut sink, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(sink.is_empty());
    assert!(model.seen().is_empty());
}

#[test]
fn config_validation_guards_from_config() {
    let mut config = EngineConfig::default();
    config.summary.max_chunks = 0;
    let store = Arc::new(InMemoryStore::new());
    let result = RagEngine::from_config(
        &config,
        Collaborators::from_store(store, Arc::new(KeywordRetrieval::new())),
    );
    assert!(matches!(result, Err(ragloom_core::Error::Config { .. })));
}
