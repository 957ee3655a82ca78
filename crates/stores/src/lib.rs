//! Collaborator store implementations for ragloom.

pub mod in_memory;
pub mod keyword;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use keyword::KeywordRetrieval;

#[cfg(feature = "postgres")]
pub use postgres::PgPromptStore;
