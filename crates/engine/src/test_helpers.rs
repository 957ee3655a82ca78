//! Shared test helpers: scripted providers and collaborators.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ragloom_core::error::{ProviderError, RetrievalError, StoreError};
use ragloom_core::knowledge::{ContentChunk, DocumentNode};
use ragloom_core::message::Message;
use ragloom_core::provider::{
    FrameReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use ragloom_core::retrieval::{QueryRecordsRequest, QueryRecordsResponse, RetrievalService};
use ragloom_core::store::{DocumentLookup, PromptStore};
use tokio::sync::mpsc;

/// A mock provider that returns a sequence of scripted completions.
///
/// Each call to `complete` returns the next entry in the queue.
/// Panics if more calls are made than entries provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let idx = requests.len();
        if idx >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                idx,
                responses.len()
            );
        }
        requests.push(request);
        responses[idx].clone().map(|text| make_text_response(&text))
    }
}

/// A provider whose completion is computed from the request.
pub struct FnProvider<F> {
    respond: F,
}

impl<F> FnProvider<F>
where
    F: Fn(&ProviderRequest) -> Result<String, ProviderError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

#[async_trait]
impl<F> Provider for FnProvider<F>
where
    F: Fn(&ProviderRequest) -> Result<String, ProviderError> + Send + Sync,
{
    fn name(&self) -> &str {
        "fn_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        (self.respond)(&request).map(|text| make_text_response(&text))
    }
}

/// A provider that streams a scripted list of frames.
pub struct StreamingMockProvider {
    frames: Vec<Result<StreamChunk, ProviderError>>,
    open_error: Option<ProviderError>,
    /// Keep the stream open after the scripted frames
    hang: bool,
    held: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl StreamingMockProvider {
    pub fn new(frames: Vec<Result<StreamChunk, ProviderError>>) -> Self {
        Self {
            frames,
            open_error: None,
            hang: false,
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn frames(frames: Vec<StreamChunk>) -> Self {
        Self::new(frames.into_iter().map(Ok).collect())
    }

    pub fn failing_open(error: ProviderError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::new(vec![])
        }
    }

    pub fn hanging(frames: Vec<StreamChunk>) -> Self {
        Self {
            hang: true,
            ..Self::frames(frames)
        }
    }
}

#[async_trait]
impl Provider for StreamingMockProvider {
    fn name(&self) -> &str {
        "streaming_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("streaming only".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<FrameReceiver, ProviderError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        let (tx, rx) = mpsc::channel(self.frames.len() + 1);
        for frame in &self.frames {
            tx.try_send(frame.clone()).unwrap();
        }
        if self.hang {
            self.held.lock().unwrap().push(tx);
        }
        Ok(rx)
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Retrieval service with one canned answer.
pub struct ScriptedRetrieval {
    rewritten_query: String,
    records: Vec<ContentChunk>,
    error: Option<RetrievalError>,
    last: Mutex<Option<QueryRecordsRequest>>,
    calls: Mutex<usize>,
}

impl ScriptedRetrieval {
    pub fn new(rewritten_query: &str, records: Vec<ContentChunk>) -> Self {
        Self {
            rewritten_query: rewritten_query.into(),
            records,
            error: None,
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(error: RetrievalError) -> Self {
        Self {
            error: Some(error),
            ..Self::new("", vec![])
        }
    }

    pub fn last_request(&self) -> Option<QueryRecordsRequest> {
        self.last.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RetrievalService for ScriptedRetrieval {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query_records(
        &self,
        request: QueryRecordsRequest,
    ) -> Result<QueryRecordsResponse, RetrievalError> {
        *self.calls.lock().unwrap() += 1;
        *self.last.lock().unwrap() = Some(request);
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(QueryRecordsResponse {
            rewritten_query: self.rewritten_query.clone(),
            records: self.records.clone(),
        })
    }
}

/// Document lookup over a fixed map.
pub struct StaticLookup {
    documents: HashMap<String, DocumentNode>,
    calls: Mutex<usize>,
}

impl StaticLookup {
    pub fn new(documents: Vec<(&str, DocumentNode)>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|(id, node)| (id.to_string(), node))
                .collect(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DocumentLookup for StaticLookup {
    async fn get_documents_by_ids(
        &self,
        doc_ids: &[String],
    ) -> Result<HashMap<String, DocumentNode>, StoreError> {
        *self.calls.lock().unwrap() += 1;
        Ok(doc_ids
            .iter()
            .filter_map(|id| self.documents.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }
}

pub struct FailingLookup;

#[async_trait]
impl DocumentLookup for FailingLookup {
    async fn get_documents_by_ids(
        &self,
        _doc_ids: &[String],
    ) -> Result<HashMap<String, DocumentNode>, StoreError> {
        Err(StoreError::Backend("connection reset".into()))
    }
}

/// A prompt store whose backend is down.
pub struct FailingPrompts;

#[async_trait]
impl PromptStore for FailingPrompts {
    async fn get_system_prompt(&self, _kb_id: &str) -> Result<String, StoreError> {
        Err(StoreError::Backend("connection reset".into()))
    }

    async fn get_summary_prompt(&self, _kb_id: &str) -> Result<String, StoreError> {
        Err(StoreError::Backend("connection reset".into()))
    }
}

/// A released document named after its node id.
pub fn node(node_id: &str) -> DocumentNode {
    DocumentNode {
        node_id: node_id.into(),
        name: format!("Doc {node_id}"),
        ..DocumentNode::default()
    }
}
