//! Summary compression.

use crate::error::{CompletionError, CompletionResult};
use crate::prompts::COMPACTION_PROMPT;
use crate::providers::{ChatMessage, GenerateOptions, Model};
use crate::session::Turn;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Condenses a run of turns into a short summary via the model.
#[derive(Clone)]
pub struct Compactor {
    model: Arc<dyn Model>,
    instruction: String,
    options: GenerateOptions,
}

impl std::fmt::Debug for Compactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compactor")
            .field("model", &self.model.model_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Compactor {
    /// Create a compactor using the default instruction.
    #[must_use]
    pub fn new(model: Arc<dyn Model>, temperature: f32) -> Self {
        Self {
            model,
            instruction: COMPACTION_PROMPT.to_string(),
            options: GenerateOptions::new().with_temperature(temperature),
        }
    }

    /// Replace the compression instruction.
    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Messages of a compression request: the instruction, then the turns.
    #[must_use]
    pub fn build_messages(&self, turns: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(self.instruction.clone()));
        messages.extend(turns.iter().map(Turn::to_message));
        messages
    }

    /// Ask the model for a summary of `turns`.
    ///
    /// # Errors
    ///
    /// Returns the engine error, or [`CompletionError::Malformed`] if the
    /// summary comes back empty.
    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    pub async fn summarize(&self, turns: &[Turn]) -> CompletionResult<String> {
        let response = self
            .model
            .generate(self.build_messages(turns), self.options)
            .await?;

        let summary = response.text.trim();
        if summary.is_empty() {
            return Err(CompletionError::malformed("empty summary"));
        }

        debug!(chars = summary.chars().count(), "summary generated");
        Ok(summary.to_string())
    }
}
