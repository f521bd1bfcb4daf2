//! Context building for completion requests.
//!
//! A reply request always has the same shape: the fixed instruction, the
//! rolling summary when there is one, then the stored turns oldest first.

use super::types::Turn;
use crate::prompts::{SUMMARY_LABEL, SYSTEM_PROMPT};
use crate::providers::ChatMessage;

/// Builder for constructing LLM message context.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    summary_label: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            summary_label: SUMMARY_LABEL.to_string(),
        }
    }
}

impl ContextBuilder {
    /// Create a context builder with the default prompts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the label prepended to the summary message.
    #[must_use]
    pub fn with_summary_label(mut self, label: impl Into<String>) -> Self {
        self.summary_label = label.into();
        self
    }

    /// Get the system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the messages array for a reply request.
    #[must_use]
    pub fn build_messages(&self, summary: &str, turns: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 2);

        messages.push(ChatMessage::system(self.system_prompt.clone()));

        if !summary.is_empty() {
            messages.push(ChatMessage::system(format!(
                "{}{summary}",
                self.summary_label
            )));
        }

        messages.extend(turns.iter().map(Turn::to_message));
        messages
    }
}
