//! Chat-completion provider implementations for ragloom.
//!
//! All providers implement the `ragloom_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
