//! # ragloom Core
//!
//! Domain types, collaborator traits, and error definitions for the ragloom
//! retrieval-augmented generation engine. This crate performs **no I/O**;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model provider, retrieval index, relational
//! store) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError, Stage, StoreError};
pub use knowledge::{ContentChunk, DocumentNode, KnowledgeBase, RankedNodeBundle};
pub use message::{Message, Role, StoredMessage};
pub use provider::{
    FrameReceiver, ModelHandle, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
pub use retrieval::{QueryRecordsRequest, QueryRecordsResponse, RetrievalService};
pub use store::{ConversationStore, DocumentLookup, KnowledgeBaseStore, PromptStore};
