//! Keyword retrieval: an in-process [`RetrievalService`] for tests and
//! small deployments.
//!
//! Scores each indexed chunk by the fraction of distinct query words that
//! appear as words in it. No embeddings, no query rewriting beyond trimming.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use ragloom_core::error::RetrievalError;
use ragloom_core::knowledge::ContentChunk;
use ragloom_core::retrieval::{QueryRecordsRequest, QueryRecordsResponse, RetrievalService};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct IndexedChunk {
    doc_id: String,
    content: String,
    /// Access groups allowed to see this chunk; empty = everyone
    group_ids: Vec<i64>,
}

/// A keyword index keyed by dataset id.
#[derive(Clone, Default)]
pub struct KeywordRetrieval {
    datasets: Arc<RwLock<HashMap<String, Vec<IndexedChunk>>>>,
}

impl KeywordRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a chunk visible to everyone.
    pub async fn add_chunk(&self, dataset_id: &str, doc_id: &str, content: &str) {
        self.add_restricted_chunk(dataset_id, doc_id, content, Vec::new())
            .await;
    }

    /// Index a chunk visible only to the given access groups.
    pub async fn add_restricted_chunk(
        &self,
        dataset_id: &str,
        doc_id: &str,
        content: &str,
        group_ids: Vec<i64>,
    ) {
        self.datasets
            .write()
            .await
            .entry(dataset_id.to_string())
            .or_default()
            .push(IndexedChunk {
                doc_id: doc_id.to_string(),
                content: content.to_string(),
                group_ids,
            });
    }

    fn score(terms: &HashSet<String>, content: &str) -> f64 {
        if terms.is_empty() {
            return 0.0;
        }
        let content_words = words(content);
        let hits = terms.iter().filter(|t| content_words.contains(*t)).count();
        hits as f64 / terms.len() as f64
    }

    fn visible(chunk: &IndexedChunk, group_ids: &[i64]) -> bool {
        group_ids.is_empty()
            || chunk.group_ids.is_empty()
            || chunk.group_ids.iter().any(|g| group_ids.contains(g))
    }
}

/// Lowercased words with surrounding punctuation removed.
fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

#[async_trait]
impl RetrievalService for KeywordRetrieval {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn query_records(
        &self,
        request: QueryRecordsRequest,
    ) -> Result<QueryRecordsResponse, RetrievalError> {
        let datasets = self.datasets.read().await;
        let chunks = datasets.get(&request.dataset_id).ok_or_else(|| {
            RetrievalError::QueryFailed(format!("unknown dataset {}", request.dataset_id))
        })?;

        let query = request.query.trim().to_string();
        let terms = words(&query);

        let mut scored: Vec<ContentChunk> = chunks
            .iter()
            .filter(|c| Self::visible(c, &request.group_ids))
            .map(|c| ContentChunk::new(&c.doc_id, &c.content, Self::score(&terms, &c.content)))
            .filter(|c| c.score > 0.0 && c.score >= request.similarity_threshold)
            .collect();

        // Stable sort keeps index order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(cap) = request.max_chunks_per_doc {
            let mut per_doc: HashMap<String, usize> = HashMap::new();
            scored.retain(|c| {
                let n = per_doc.entry(c.doc_id.clone()).or_default();
                *n += 1;
                *n <= cap
            });
        }

        debug!(
            dataset = %request.dataset_id,
            terms = terms.len(),
            records = scored.len(),
            "keyword retrieval"
        );

        Ok(QueryRecordsResponse {
            rewritten_query: query,
            records: scored,
        })
    }
}
