//! Prompt/context builder.
//!
//! Turns a stored conversation plus a knowledge base into the message list
//! for one generation call:
//!
//! ```text
//! [system (templated)] + [prior history, oldest first] + [user (templated)]
//! ```
//!
//! The last history entry is the question. Retrieval runs on it, and the
//! user turn carries the rewritten query and the formatted documents.

use std::sync::Arc;

use ragloom_config::RetrievalConfig;
use ragloom_core::error::{Error, Result, Stage};
use ragloom_core::message::{Message, Role, StoredMessage};
use ragloom_core::retrieval::RetrievalService;
use ragloom_core::store::{ConversationStore, DocumentLookup, KnowledgeBaseStore, PromptStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::cancellable;
use crate::context::documents::format_documents;
use crate::context::template::{DEFAULT_SYSTEM_PROMPT, PromptTemplate, PromptVars, USER_TEMPLATE};
use crate::ranking::{RankNodesRequest, RankedNodes, rank_nodes};

/// Inputs for one build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub conversation_id: String,
    pub kb_id: String,
    /// Access-group filter passed to retrieval; empty means no filter
    pub group_ids: Vec<i64>,
    /// Overrides the stored and built-in system prompts when non-empty
    pub system_prompt: Option<String>,
}

/// The assembled messages plus the ranking they were built from.
#[derive(Debug, Clone, Default)]
pub struct BuiltContext {
    pub messages: Vec<Message>,
    pub ranked: RankedNodes,
}

impl BuiltContext {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Assembles generation context from the relational store and the retrieval
/// service.
pub struct ContextBuilder {
    conversations: Arc<dyn ConversationStore>,
    knowledge_bases: Arc<dyn KnowledgeBaseStore>,
    prompts: Arc<dyn PromptStore>,
    retrieval: Arc<dyn RetrievalService>,
    documents: Arc<dyn DocumentLookup>,
    config: RetrievalConfig,
    user_template: String,
    current_date: Option<String>,
}

impl ContextBuilder {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        knowledge_bases: Arc<dyn KnowledgeBaseStore>,
        prompts: Arc<dyn PromptStore>,
        retrieval: Arc<dyn RetrievalService>,
        documents: Arc<dyn DocumentLookup>,
    ) -> Self {
        Self {
            conversations,
            knowledge_bases,
            prompts,
            retrieval,
            documents,
            config: RetrievalConfig::default(),
            user_template: USER_TEMPLATE.to_string(),
            current_date: None,
        }
    }

    pub fn with_retrieval_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_user_template(mut self, template: impl Into<String>) -> Self {
        self.user_template = template.into();
        self
    }

    /// Pin the date rendered into prompts (`YYYY-MM-DD`).
    pub fn with_current_date(mut self, date: impl Into<String>) -> Self {
        self.current_date = Some(date.into());
        self
    }

    /// Build the message list for one generation.
    ///
    /// An empty conversation yields an empty context without touching the
    /// retrieval service.
    pub async fn build(
        &self,
        request: BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuiltContext> {
        let stored = cancellable(cancel, self.conversations.get_messages(&request.conversation_id))
            .await?
            .map_err(|e| Error::from(e).at(Stage::LoadHistory))?;

        let mut history = convert_history(stored);
        let Some(last) = history.pop() else {
            debug!(conversation_id = %request.conversation_id, "no history, nothing to build");
            return Ok(BuiltContext::default());
        };
        let question = last.content;

        let system_prompt = self
            .resolve_system_prompt(&request.kb_id, request.system_prompt, cancel)
            .await?;

        let kb = cancellable(cancel, self.knowledge_bases.get_by_id(&request.kb_id))
            .await?
            .map_err(|e| Error::from(e).at(Stage::LoadKnowledgeBase))?;

        let ranked = rank_nodes(
            self.retrieval.as_ref(),
            self.documents.as_ref(),
            RankNodesRequest {
                dataset_id: kb.dataset_id.clone(),
                question,
                group_ids: request.group_ids,
                similarity_threshold: self.config.similarity_threshold,
                history: history.clone(),
                max_chunks_per_doc: self.config.max_chunks_per_doc,
            },
            cancel,
        )
        .await
        .map_err(|e| e.at(Stage::RankNodes))?;

        let documents = format_documents(&ranked.bundles, &kb.base_url);
        debug!(documents = %documents, "formatted documents");

        let current_date = self
            .current_date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

        let template = PromptTemplate::with_user_template(system_prompt, self.user_template.as_str());
        let (system, user) = template
            .render(&PromptVars {
                current_date: &current_date,
                question: &ranked.rewritten_query,
                documents: &documents,
            })
            .map_err(|e| e.at(Stage::RenderPrompt))?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system);
        messages.extend(history);
        messages.push(user);

        info!(
            conversation_id = %request.conversation_id,
            kb_id = %request.kb_id,
            messages = messages.len(),
            bundles = ranked.bundles.len(),
            "context built"
        );

        Ok(BuiltContext { messages, ranked })
    }

    /// Caller prompt, else the stored prompt, else the built-in default.
    ///
    /// A prompt store failure is logged and falls through to the default.
    async fn resolve_system_prompt(
        &self,
        kb_id: &str,
        explicit: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if let Some(prompt) = explicit.filter(|p| !p.trim().is_empty()) {
            return Ok(prompt);
        }

        match cancellable(cancel, self.prompts.get_system_prompt(kb_id)).await? {
            Ok(stored) if !stored.trim().is_empty() => Ok(stored),
            Ok(_) => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
            Err(e) => {
                warn!(kb_id, error = %e, "system prompt lookup failed, using default");
                Ok(DEFAULT_SYSTEM_PROMPT.to_string())
            }
        }
    }
}

/// Convert stored history into model messages.
///
/// Only user and assistant entries survive. User entries get their images
/// appended as inline Markdown.
pub fn convert_history(stored: Vec<StoredMessage>) -> Vec<Message> {
    stored
        .into_iter()
        .filter_map(|m| match m.parsed_role() {
            Some(Role::Assistant) => Some(Message::assistant(m.content)),
            Some(Role::User) => Some(Message::user(with_images(&m.content, &m.image_paths))),
            _ => None,
        })
        .collect()
}

fn with_images(content: &str, image_paths: &[String]) -> String {
    let mut out = content.to_string();
    for path in image_paths {
        out.push_str("\n![](");
        out.push_str(path);
        out.push(')');
    }
    out
}
