//! Knowledge-base domain types: retrieved chunks, resolved documents and the
//! per-document bundles built from them.

use serde::{Deserialize, Serialize};

/// A knowledge base as the engine needs to see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    /// Dataset identifier inside the retrieval service
    pub dataset_id: String,
    /// Public base URL used for links in formatted documents (may be empty)
    #[serde(default)]
    pub base_url: String,
}

/// A unit of retrieved text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Source-document identifier in the retrieval index
    pub doc_id: String,
    pub content: String,
    /// Relevance score assigned by the retrieval service
    #[serde(default)]
    pub score: f64,
}

impl ContentChunk {
    pub fn new(doc_id: impl Into<String>, content: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            content: content.into(),
            score,
        }
    }
}

/// Release metadata for a document, resolved from its retrieval doc id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub node_id: String,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub emoji: String,
    /// Names of the ancestor folders, root first
    #[serde(default)]
    pub path_names: Vec<String>,
}

/// All retrieved chunks for one source document plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNodeBundle {
    pub node_id: String,
    pub node_name: String,
    pub node_summary: String,
    pub node_emoji: String,
    pub node_path_names: Vec<String>,
    /// Chunks in retrieval order
    pub chunks: Vec<ContentChunk>,
}

impl RankedNodeBundle {
    /// Start a bundle for `node` seeded with its first chunk.
    pub fn new(node: &DocumentNode, first: ContentChunk) -> Self {
        Self {
            node_id: node.node_id.clone(),
            node_name: node.name.clone(),
            node_summary: node.summary.clone(),
            node_emoji: node.emoji.clone(),
            node_path_names: node.path_names.clone(),
            chunks: vec![first],
        }
    }
}
