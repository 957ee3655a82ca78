//! Token-bounded summarizer.
//!
//! Long documents are split into token-bounded pieces. Each piece is
//! summarized on its own, then the piece summaries are condensed in one
//! final pass. Failed pieces are skipped and recorded. If the final pass
//! fails, the joined piece summaries are returned truncated and the outcome
//! is marked degraded.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use ragloom_config::SummaryConfig;
use ragloom_core::error::{Error, Result, Stage};
use ragloom_core::message::Message;
use ragloom_core::provider::ModelHandle;
use ragloom_core::store::PromptStore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cancel::cancellable;
use crate::token::Tokenizer;

/// Built-in summary prompt, used when the knowledge base has none.
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
You are a document summarization assistant. Summarize the document the user \
provides in a single concise paragraph of no more than 200 words. Keep the key \
facts, names and numbers. Write in the same language as the document. Output \
only the summary, with no preamble.";

const SEPARATOR: &str = "\n\n";
const ELLIPSIS: &str = "...";

/// One piece that produced no summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub reason: String,
}

/// Result of one summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOutcome {
    pub summary: String,
    /// Pieces the document split into
    pub chunks_total: usize,
    /// Pieces actually sent for summarization
    pub chunks_used: usize,
    pub failures: Vec<ChunkFailure>,
    /// True when the final pass failed and the fallback text was returned
    pub degraded: bool,
}

/// Summarizes documents with a per-knowledge-base prompt.
pub struct Summarizer {
    tokenizer: Tokenizer,
    prompts: Arc<dyn PromptStore>,
    config: SummaryConfig,
}

impl Summarizer {
    pub fn new(tokenizer: Tokenizer, prompts: Arc<dyn PromptStore>) -> Self {
        Self {
            tokenizer,
            prompts,
            config: SummaryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SummaryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Summarize `content`, a document called `name`.
    pub async fn summarize(
        &self,
        kb_id: &str,
        model: &ModelHandle,
        name: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<SummaryOutcome> {
        if self.config.max_chunks == 0 {
            return Err(Error::InvalidInput("summary max_chunks must be positive".into()));
        }

        let mut pieces = self
            .tokenizer
            .split_by_token_limit(content, self.config.chunk_token_limit)?;
        let chunks_total = pieces.len();
        if chunks_total > self.config.max_chunks {
            debug!(
                document = name,
                original_chunks = chunks_total,
                used_chunks = self.config.max_chunks,
                "trim summary chunks for large document"
            );
            pieces.truncate(self.config.max_chunks);
        }
        let chunks_used = pieces.len();

        let prompt = match self.summary_prompt(kb_id, cancel).await {
            Ok(prompt) => prompt,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                error!(document = name, error = %e, "summary prompt unavailable");
                return Err(Error::NoSummary {
                    document: name.to_string(),
                    source: Some(Box::new(e)),
                });
            }
        };

        let results: Vec<Result<String>> = stream::iter(pieces.iter())
            .map(|piece| request_summary(model, &prompt, name, piece, cancel))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summaries = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (chunk_index, result) in results.into_iter().enumerate() {
            match result {
                Ok(summary) if !summary.is_empty() => summaries.push(summary),
                Ok(_) => {
                    warn!(document = name, chunk_index, "empty summary returned for chunk");
                    failures.push(ChunkFailure {
                        chunk_index,
                        reason: "empty summary".into(),
                    });
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(document = name, chunk_index, error = %e, "chunk summary failed");
                    failures.push(ChunkFailure {
                        chunk_index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if summaries.is_empty() {
            return Err(Error::NoSummary {
                document: name.to_string(),
                source: None,
            });
        }

        let joined = summaries.join(SEPARATOR);
        let (summary, degraded) = match request_summary(model, &prompt, name, &joined, cancel).await
        {
            Ok(summary) if !summary.is_empty() => (summary, false),
            Err(e) if e.is_cancelled() => return Err(e),
            other => {
                let reason = match other {
                    Err(e) => e.to_string(),
                    Ok(_) => "empty summary".to_string(),
                };
                warn!(
                    document = name,
                    degraded = true,
                    error = %reason,
                    "final summary failed, using joined chunk summaries"
                );
                (truncate_chars(&joined, self.config.fallback_max_chars), true)
            }
        };

        info!(
            document = name,
            chunks_total,
            chunks_used,
            failures = failures.len(),
            degraded,
            "document summarized"
        );

        Ok(SummaryOutcome {
            summary,
            chunks_total,
            chunks_used,
            failures,
            degraded,
        })
    }

    async fn summary_prompt(&self, kb_id: &str, cancel: &CancellationToken) -> Result<String> {
        let stored = cancellable(cancel, self.prompts.get_summary_prompt(kb_id))
            .await?
            .map_err(|e| Error::from(e).at(Stage::LoadSummaryPrompt))?;
        if stored.trim().is_empty() {
            Ok(DEFAULT_SUMMARY_PROMPT.to_string())
        } else {
            Ok(stored)
        }
    }
}

/// One non-streaming summary call.
async fn request_summary(
    model: &ModelHandle,
    prompt: &str,
    name: &str,
    content: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let request = model.request(
        vec![
            Message::system(prompt),
            Message::user(format!("Document name: {name}\nDocument content: {content}")),
        ],
        false,
    );
    let response = cancellable(cancel, model.provider().complete(request)).await??;
    Ok(trim_thinking(&response.message.content))
}

/// Strip a leading `<think>...</think>` block, then trim.
///
/// Text that does not start with `<think>`, or whose block is never closed,
/// is only trimmed.
pub fn trim_thinking(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    if let Some(rest) = text.strip_prefix(OPEN) {
        if let Some(end) = rest.find(CLOSE) {
            return rest[end + CLOSE.len()..].trim().to_string();
        }
    }
    text.trim().to_string()
}

/// Keep at most `max_chars` characters, marking a cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{ELLIPSIS}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
