//! Store traits: the narrow read interfaces onto the relational store.
//!
//! Persistence of conversations, knowledge bases and settings belongs to the
//! enclosing service. The engine only reads through these traits.
//!
//! Implementations: in-memory (for testing and embedding), PostgreSQL
//! prompt settings.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::knowledge::{DocumentNode, KnowledgeBase};
use crate::message::StoredMessage;

/// Conversation history, oldest first.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_messages(
        &self,
        conversation_id: &str,
    ) -> std::result::Result<Vec<StoredMessage>, StoreError>;
}

#[async_trait]
pub trait KnowledgeBaseStore: Send + Sync {
    async fn get_by_id(&self, kb_id: &str) -> std::result::Result<KnowledgeBase, StoreError>;
}

/// Per-knowledge-base prompt settings.
///
/// An empty string means "not configured"; the engine then falls back to
/// its built-in defaults.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn get_system_prompt(&self, kb_id: &str) -> std::result::Result<String, StoreError>;

    async fn get_summary_prompt(&self, kb_id: &str) -> std::result::Result<String, StoreError>;
}

/// Resolves retrieval doc ids to released document metadata.
///
/// Ids with no released document are simply absent from the returned map.
#[async_trait]
pub trait DocumentLookup: Send + Sync {
    async fn get_documents_by_ids(
        &self,
        doc_ids: &[String],
    ) -> std::result::Result<HashMap<String, DocumentNode>, StoreError>;
}
