//! Prompt/context assembly.
//!
//! | Piece | Source |
//! |-------|--------|
//! | System message | caller prompt, stored prompt, or built-in default |
//! | Prior history | conversation store, minus the last entry |
//! | User message | template over date, rewritten query and documents |

pub mod builder;
pub mod documents;
pub mod template;

pub use builder::{BuildRequest, BuiltContext, ContextBuilder, convert_history};
pub use documents::format_documents;
pub use template::{DEFAULT_SYSTEM_PROMPT, PromptTemplate, PromptVars, USER_TEMPLATE};
