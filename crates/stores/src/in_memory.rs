//! In-memory store, useful for testing and for embedding the engine without
//! a database.
//!
//! One [`InMemoryStore`] implements every read trait the engine needs:
//! conversations, knowledge bases, prompt settings and document lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragloom_core::error::StoreError;
use ragloom_core::knowledge::{DocumentNode, KnowledgeBase};
use ragloom_core::message::StoredMessage;
use ragloom_core::store::{ConversationStore, DocumentLookup, KnowledgeBaseStore, PromptStore};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct PromptSetting {
    system: String,
    summary: String,
}

#[derive(Debug, Default)]
struct Inner {
    conversations: HashMap<String, Vec<StoredMessage>>,
    knowledge_bases: HashMap<String, KnowledgeBase>,
    prompts: HashMap<String, PromptSetting>,
    documents: HashMap<String, DocumentNode>,
}

/// A store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new conversation and return its id.
    pub async fn create_conversation(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.inner
            .write()
            .await
            .conversations
            .insert(id.clone(), Vec::new());
        id
    }

    /// Append a history entry, creating the conversation if needed.
    pub async fn push_message(&self, conversation_id: &str, message: StoredMessage) {
        self.inner
            .write()
            .await
            .conversations
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    pub async fn put_knowledge_base(&self, kb: KnowledgeBase) {
        self.inner
            .write()
            .await
            .knowledge_bases
            .insert(kb.id.clone(), kb);
    }

    pub async fn set_system_prompt(&self, kb_id: &str, prompt: impl Into<String>) {
        self.inner
            .write()
            .await
            .prompts
            .entry(kb_id.to_string())
            .or_default()
            .system = prompt.into();
    }

    pub async fn set_summary_prompt(&self, kb_id: &str, prompt: impl Into<String>) {
        self.inner
            .write()
            .await
            .prompts
            .entry(kb_id.to_string())
            .or_default()
            .summary = prompt.into();
    }

    /// Register the released document a retrieval doc id resolves to.
    pub async fn put_document(&self, doc_id: impl Into<String>, node: DocumentNode) {
        self.inner
            .write()
            .await
            .documents
            .insert(doc_id.into(), node);
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "conversation".into(),
                id: conversation_id.to_string(),
            })
    }
}

#[async_trait]
impl KnowledgeBaseStore for InMemoryStore {
    async fn get_by_id(&self, kb_id: &str) -> Result<KnowledgeBase, StoreError> {
        let inner = self.inner.read().await;
        inner
            .knowledge_bases
            .get(kb_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "knowledge base".into(),
                id: kb_id.to_string(),
            })
    }
}

#[async_trait]
impl PromptStore for InMemoryStore {
    async fn get_system_prompt(&self, kb_id: &str) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .prompts
            .get(kb_id)
            .map(|p| p.system.clone())
            .unwrap_or_default())
    }

    async fn get_summary_prompt(&self, kb_id: &str) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .prompts
            .get(kb_id)
            .map(|p| p.summary.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentLookup for InMemoryStore {
    async fn get_documents_by_ids(
        &self,
        doc_ids: &[String],
    ) -> Result<HashMap<String, DocumentNode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(doc_ids
            .iter()
            .filter_map(|id| inner.documents.get(id).map(|node| (id.clone(), node.clone())))
            .collect())
    }
}
