//! Error types for the ragloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum; [`Error`] wraps them
//! and adds the engine's own failure modes.

use thiserror::Error;

/// The top-level error type for all ragloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A failure tagged with the pipeline stage it happened in.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    // --- Engine errors ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// No summary text survived for the document. `source` is the failure
    /// that stopped summarization early, if there was one.
    #[error("No summary could be generated for document {document}")]
    NoSummary {
        document: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Sink rejected chunk: {0}")]
    Sink(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Tag this error with the stage it occurred in.
    ///
    /// Cancellation is never wrapped so callers can match on it directly.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            Error::Cancelled => Error::Cancelled,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was tagged with, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// True when the error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Stage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stages used to label upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadHistory,
    LoadKnowledgeBase,
    QueryRetrieval,
    LookupDocuments,
    RankNodes,
    RenderPrompt,
    OpenStream,
    ReadStream,
    DeliverChunk,
    LoadSummaryPrompt,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::LoadHistory => "get conversation messages",
            Stage::LoadKnowledgeBase => "get knowledge base",
            Stage::QueryRetrieval => "query retrieval records",
            Stage::LookupDocuments => "get documents by ids",
            Stage::RankNodes => "get rank nodes",
            Stage::RenderPrompt => "format messages",
            Stage::OpenStream => "open stream",
            Stage::ReadStream => "receive stream frame",
            Stage::DeliverChunk => "deliver chunk",
            Stage::LoadSummaryPrompt => "get summary prompt",
        };
        f.write_str(label)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval service unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
