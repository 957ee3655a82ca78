//! The engine facade: one object wiring the builder, the chat orchestrator
//! and the summarizer to one model and one set of collaborators.

use std::sync::Arc;

use ragloom_config::EngineConfig;
use ragloom_core::error::{Error, Result};
use ragloom_core::message::Message;
use ragloom_core::provider::ModelHandle;
use ragloom_core::retrieval::RetrievalService;
use ragloom_core::store::{ConversationStore, DocumentLookup, KnowledgeBaseStore, PromptStore};
use ragloom_providers::OpenAiCompatProvider;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat::{ChatOutcome, ChunkSink, stream_chat};
use crate::context::{BuildRequest, BuiltContext, ContextBuilder};
use crate::ranking::RankedNodes;
use crate::summarizer::{SummaryOutcome, Summarizer};
use crate::token::Tokenizer;

/// The external services the engine reads from.
#[derive(Clone)]
pub struct Collaborators {
    pub conversations: Arc<dyn ConversationStore>,
    pub knowledge_bases: Arc<dyn KnowledgeBaseStore>,
    pub prompts: Arc<dyn PromptStore>,
    pub retrieval: Arc<dyn RetrievalService>,
    pub documents: Arc<dyn DocumentLookup>,
}

impl Collaborators {
    /// Use one value for every store trait.
    pub fn from_store<S>(store: Arc<S>, retrieval: Arc<dyn RetrievalService>) -> Self
    where
        S: ConversationStore + KnowledgeBaseStore + PromptStore + DocumentLookup + 'static,
    {
        Self {
            conversations: store.clone(),
            knowledge_bases: store.clone(),
            prompts: store.clone(),
            retrieval,
            documents: store,
        }
    }
}

/// Result of a retrieval-augmented chat turn.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub ranked: RankedNodes,
    /// `None` when the conversation had nothing to answer
    pub outcome: Option<ChatOutcome>,
}

/// Retrieval-augmented chat and document summarization over one model.
pub struct RagEngine {
    builder: ContextBuilder,
    summarizer: Summarizer,
    model: ModelHandle,
}

impl RagEngine {
    /// Wire the engine from configuration, using an OpenAI-compatible
    /// provider for the model.
    pub fn from_config(config: &EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let provider = OpenAiCompatProvider::from_config(&config.provider)?;
        let model = ModelHandle::new(Arc::new(provider), config.provider.model.clone())
            .with_temperature(config.provider.temperature)
            .with_max_tokens(config.provider.max_tokens);

        info!(
            provider = %config.provider.name,
            model = %config.provider.model,
            "engine configured"
        );
        Self::new(config, collaborators, model)
    }

    /// Wire the engine around an existing model handle.
    pub fn new(
        config: &EngineConfig,
        collaborators: Collaborators,
        model: ModelHandle,
    ) -> Result<Self> {
        let builder = ContextBuilder::new(
            collaborators.conversations,
            collaborators.knowledge_bases,
            collaborators.prompts.clone(),
            collaborators.retrieval,
            collaborators.documents,
        )
        .with_retrieval_config(config.retrieval.clone());
        let summarizer = Summarizer::new(Tokenizer::cl100k()?, collaborators.prompts)
            .with_config(config.summary.clone());
        Ok(Self::from_parts(builder, summarizer, model))
    }

    pub fn from_parts(builder: ContextBuilder, summarizer: Summarizer, model: ModelHandle) -> Self {
        Self {
            builder,
            summarizer,
            model,
        }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Assemble the messages for the next answer in a conversation.
    pub async fn build_context(
        &self,
        request: BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuiltContext> {
        self.builder.build(request, cancel).await
    }

    /// Stream an answer for already-assembled messages.
    pub async fn stream(
        &self,
        messages: Vec<Message>,
        sink: &mut dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome> {
        stream_chat(&self.model, messages, sink, cancel).await
    }

    /// Build context for the conversation and stream the answer into `sink`.
    ///
    /// An empty conversation streams nothing.
    pub async fn chat(
        &self,
        request: BuildRequest,
        sink: &mut dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<ChatReply> {
        let built = self.builder.build(request, cancel).await?;
        if built.is_empty() {
            return Ok(ChatReply::default());
        }
        let outcome = stream_chat(&self.model, built.messages, sink, cancel).await?;
        Ok(ChatReply {
            ranked: built.ranked,
            outcome: Some(outcome),
        })
    }

    /// Summarize one document with the knowledge base's summary prompt.
    pub async fn summarize(
        &self,
        kb_id: &str,
        name: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome> {
        self.summarizer
            .summarize(kb_id, &self.model, name, content, cancel)
            .await
    }
}
