//! The ragloom engine.
//!
//! Four components, leaf first:
//!
//! 1. **Tokenizer** ([`token`]): `cl100k_base` encode/decode and
//!    token-bounded splitting
//! 2. **Ranking** ([`ranking`]): one retrieval call grouped into
//!    per-document bundles
//! 3. **Context** ([`context`]): history + ranking + templates into the
//!    message list for a generation
//! 4. **Chat** ([`chat`]) and **Summarizer** ([`summarizer`]): streaming
//!    answers with reasoning markers, and multi-piece document summaries
//!
//! [`RagEngine`] wires them to one model and one set of collaborators.
//! Every entry point takes a `CancellationToken`.

pub mod cancel;
pub mod chat;
pub mod context;
pub mod engine;
pub mod ranking;
pub mod summarizer;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chat::{ChatChunk, ChatOutcome, ChunkKind, ChunkSink, Segment, ThinkMarkers, stream_chat};
pub use context::{BuildRequest, BuiltContext, ContextBuilder, DEFAULT_SYSTEM_PROMPT};
pub use engine::{ChatReply, Collaborators, RagEngine};
pub use ranking::{RankNodesRequest, RankedNodes, rank_nodes};
pub use summarizer::{
    ChunkFailure, DEFAULT_SUMMARY_PROMPT, SummaryOutcome, Summarizer, trim_thinking,
};
pub use token::Tokenizer;
pub use tokio_util::sync::CancellationToken;
