//! Retrieval service trait: the abstraction over the vector/keyword index.
//!
//! The index itself lives outside the engine. The engine sends a question
//! plus conversation history and gets back a (possibly rewritten) query and
//! the matching content chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::knowledge::ContentChunk;
use crate::message::Message;

/// A retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecordsRequest {
    pub dataset_id: String,
    pub query: String,
    /// Access-group filter; empty means no filter
    #[serde(default)]
    pub group_ids: Vec<i64>,
    pub similarity_threshold: f64,
    /// Prior conversation turns, oldest first
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunks_per_doc: Option<usize>,
}

/// The retrieval service's answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRecordsResponse {
    /// The query the service actually searched with
    pub rewritten_query: String,
    /// Matching chunks, in the service's ranking order
    pub records: Vec<ContentChunk>,
}

#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// A human-readable name for this service.
    fn name(&self) -> &str;

    /// Run one retrieval query.
    async fn query_records(
        &self,
        request: QueryRecordsRequest,
    ) -> std::result::Result<QueryRecordsResponse, RetrievalError>;
}
