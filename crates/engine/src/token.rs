//! Tokenizer adapter.
//!
//! Wraps the `cl100k_base` byte-pair encoding from `tiktoken-rs`. All chunk
//! boundaries in the summarizer come from here, so the same text and limit
//! always split the same way.

use std::sync::Arc;

use ragloom_core::error::{Error, Result};
use tiktoken_rs::CoreBPE;

/// Name of the encoding used for every token count in the engine.
pub const ENCODING: &str = "cl100k_base";

/// A shared handle onto the BPE tables. Cheap to clone.
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

impl Tokenizer {
    /// Load the `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Tokenizer(format!("load {ENCODING}: {e}")))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Encode text. Special-token text is treated as plain text.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    /// Decode a token slice. Fails when the bytes are not valid UTF-8.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| Error::Tokenizer(e.to_string()))
    }

    /// Split the token sequence of `text` into consecutive windows of at
    /// most `limit` tokens, each of which decodes to valid UTF-8.
    ///
    /// Windows are taken left to right. A window whose last token cuts a
    /// character in half is shortened until it decodes. When a single
    /// character needs more than `limit` tokens, its window grows just far
    /// enough to hold it, so that one window exceeds the limit. The windows
    /// always concatenate back to the full token sequence.
    pub fn split_tokens(&self, text: &str, limit: usize) -> Result<Vec<Vec<u32>>> {
        if limit == 0 {
            return Err(Error::InvalidInput("token limit must be positive".into()));
        }

        let tokens = self.encode(text);
        if tokens.len() <= limit {
            return Ok(vec![tokens]);
        }

        let mut windows = Vec::with_capacity(tokens.len() / limit + 1);
        let mut start = 0;
        while start < tokens.len() {
            let upper = (start + limit).min(tokens.len());
            let mut end = upper;
            while end > start && self.decode(&tokens[start..end]).is_err() {
                end -= 1;
            }
            if end == start {
                end = self.widen_window(&tokens, start, upper)?;
            }
            windows.push(tokens[start..end].to_vec());
            start = end;
        }
        Ok(windows)
    }

    /// First `end > from` at which `tokens[start..end]` decodes.
    fn widen_window(&self, tokens: &[u32], start: usize, from: usize) -> Result<usize> {
        (from + 1..=tokens.len())
            .find(|&end| self.decode(&tokens[start..end]).is_ok())
            .ok_or_else(|| {
                Error::Tokenizer(format!("no decodable window at token offset {start}"))
            })
    }

    /// Split `text` into pieces of at most `limit` tokens each.
    ///
    /// Text that already fits comes back as a single piece, unchanged.
    pub fn split_by_token_limit(&self, text: &str, limit: usize) -> Result<Vec<String>> {
        let windows = self.split_tokens(text, limit)?;
        if windows.len() == 1 {
            return Ok(vec![text.to_string()]);
        }
        windows.iter().map(|w| self.decode(w)).collect()
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("encoding", &ENCODING)
            .finish()
    }
}
