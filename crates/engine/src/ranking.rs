//! Retrieval ranking.
//!
//! One retrieval call, one document lookup, then a single pass that groups
//! chunks into per-document bundles. Bundle order is the order in which each
//! document first appears in the retrieval result; nothing is re-sorted.

use std::collections::{HashMap, HashSet};

use ragloom_core::error::{Error, Result, Stage};
use ragloom_core::knowledge::{ContentChunk, DocumentNode, RankedNodeBundle};
use ragloom_core::message::Message;
use ragloom_core::retrieval::{QueryRecordsRequest, RetrievalService};
use ragloom_core::store::DocumentLookup;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancel::cancellable;

/// Inputs for one ranking call.
#[derive(Debug, Clone)]
pub struct RankNodesRequest {
    pub dataset_id: String,
    pub question: String,
    pub group_ids: Vec<i64>,
    pub similarity_threshold: f64,
    /// Conversation turns before the question, oldest first
    pub history: Vec<Message>,
    pub max_chunks_per_doc: Option<usize>,
}

/// Ranked bundles plus what the grouping pass had to drop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedNodes {
    /// The query the retrieval service searched with
    pub rewritten_query: String,
    pub bundles: Vec<RankedNodeBundle>,
    /// Doc ids with no released document, in first-seen order
    pub unresolved_doc_ids: Vec<String>,
}

/// Query the retrieval service and group its chunks by source document.
///
/// A retrieval or lookup failure fails the whole call. Chunks whose document
/// cannot be resolved are dropped and reported in `unresolved_doc_ids`.
pub async fn rank_nodes(
    retrieval: &dyn RetrievalService,
    lookup: &dyn DocumentLookup,
    request: RankNodesRequest,
    cancel: &CancellationToken,
) -> Result<RankedNodes> {
    let query = QueryRecordsRequest {
        dataset_id: request.dataset_id,
        query: request.question,
        group_ids: request.group_ids,
        similarity_threshold: request.similarity_threshold,
        history: request.history,
        max_chunks_per_doc: request.max_chunks_per_doc,
    };

    let response = cancellable(cancel, retrieval.query_records(query))
        .await?
        .map_err(|e| Error::from(e).at(Stage::QueryRetrieval))?;

    info!(
        service = retrieval.name(),
        rewritten_query = %response.rewritten_query,
        records = response.records.len(),
        "retrieval returned records"
    );

    if response.records.is_empty() {
        return Ok(RankedNodes {
            rewritten_query: response.rewritten_query,
            ..RankedNodes::default()
        });
    }

    let doc_ids = unique_doc_ids(&response.records);
    debug!(doc_ids = ?doc_ids, "resolving documents");

    let documents = cancellable(cancel, lookup.get_documents_by_ids(&doc_ids))
        .await?
        .map_err(|e| Error::from(e).at(Stage::LookupDocuments))?;

    let ranked = group_chunks(response.rewritten_query, response.records, &documents);
    if !ranked.unresolved_doc_ids.is_empty() {
        debug!(
            unresolved = ?ranked.unresolved_doc_ids,
            "dropped chunks of unreleased documents"
        );
    }
    Ok(ranked)
}

/// Distinct doc ids in first-seen order.
fn unique_doc_ids(records: &[ContentChunk]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.doc_id.as_str()))
        .map(|r| r.doc_id.clone())
        .collect()
}

/// The grouping fold: resolved chunks go into bundles, the rest are recorded.
fn group_chunks(
    rewritten_query: String,
    records: Vec<ContentChunk>,
    documents: &HashMap<String, DocumentNode>,
) -> RankedNodes {
    let mut bundles: Vec<RankedNodeBundle> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unresolved: Vec<String> = Vec::new();
    let mut unresolved_seen: HashSet<String> = HashSet::new();

    for chunk in records {
        if let Some(&idx) = position.get(&chunk.doc_id) {
            bundles[idx].chunks.push(chunk);
            continue;
        }
        match documents.get(&chunk.doc_id) {
            Some(node) => {
                position.insert(chunk.doc_id.clone(), bundles.len());
                bundles.push(RankedNodeBundle::new(node, chunk));
            }
            None => {
                if unresolved_seen.insert(chunk.doc_id.clone()) {
                    unresolved.push(chunk.doc_id);
                }
            }
        }
    }

    RankedNodes {
        rewritten_query,
        bundles,
        unresolved_doc_ids: unresolved,
    }
}
