//! Prompt templates.
//!
//! Both the system prompt and the user turn are Handlebars templates over
//! the same variables: `{{current_date}}`, `{{question}}` and
//! `{{documents}}`. Output is not HTML-escaped. Unknown variables render as
//! empty text so stored prompts written for other variables still render.

use handlebars::Handlebars;
use ragloom_core::error::{Error, Result};
use ragloom_core::message::Message;
use serde::Serialize;

/// Built-in system prompt, used when neither the caller nor the prompt
/// store supplies one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a knowledge base assistant. Answer the user's question using only the \
documents provided in the user message.

Rules:
- If the documents do not contain the answer, say that you could not find it \
in the knowledge base. Do not make up an answer.
- Answer in the same language as the question.
- When you use a document, cite it by its title and link it with its URL when \
one is given.
- Format the answer as Markdown.";

/// Built-in user turn.
pub const USER_TEMPLATE: &str = "\
Current date: {{current_date}}

<documents>
{{documents}}
</documents>

Question: {{question}}";

/// Values interpolated into both templates.
#[derive(Debug, Clone, Serialize)]
pub struct PromptVars<'a> {
    pub current_date: &'a str,
    pub question: &'a str,
    pub documents: &'a str,
}

/// The system/user template pair.
pub struct PromptTemplate {
    registry: Handlebars<'static>,
    system: String,
    user: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>) -> Self {
        Self::with_user_template(system, USER_TEMPLATE)
    }

    pub fn with_user_template(system: impl Into<String>, user: impl Into<String>) -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(false);
        Self {
            registry,
            system: system.into(),
            user: user.into(),
        }
    }

    /// Render the system message and the user message, in that order.
    pub fn render(&self, vars: &PromptVars<'_>) -> Result<(Message, Message)> {
        let system = self.render_one(&self.system, vars)?;
        let user = self.render_one(&self.user, vars)?;
        Ok((Message::system(system), Message::user(user)))
    }

    fn render_one(&self, template: &str, vars: &PromptVars<'_>) -> Result<String> {
        self.registry
            .render_template(template, vars)
            .map_err(|e| Error::Template(e.to_string()))
    }
}
