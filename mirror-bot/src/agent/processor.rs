//! Turn processing: one user message in, one reply out, memory kept tidy.

use super::compaction::Compactor;
use crate::config::GenerationConfig;
use crate::error::{CompletionError, CompletionResult};
use crate::providers::{GenerateOptions, Model};
use crate::session::{SessionStore, TurnRole};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of a compaction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Not due, or another compaction is already running.
    Skipped,
    /// The summary was extended and the turns trimmed.
    Compacted {
        /// Number of turns sent to the model.
        turns: usize,
        /// Characters in the summary after compaction.
        summary_chars: usize,
    },
    /// The session was reset while the model was working.
    Discarded,
}

/// Runs conversational turns against the model and maintains session memory.
pub struct TurnProcessor {
    sessions: Arc<SessionStore>,
    model: Arc<dyn Model>,
    compactor: Compactor,
    reply_options: GenerateOptions,
}

impl std::fmt::Debug for TurnProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnProcessor")
            .field("model", &self.model.model_id())
            .field("reply_options", &self.reply_options)
            .finish_non_exhaustive()
    }
}

impl TurnProcessor {
    /// Create a processor over a shared session store.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        model: Arc<dyn Model>,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            compactor: Compactor::new(Arc::clone(&model), generation.summary_temperature),
            reply_options: GenerateOptions::new().with_temperature(generation.reply_temperature),
            sessions,
            model,
        }
    }

    /// Replace the compactor.
    #[must_use]
    pub fn with_compactor(mut self, compactor: Compactor) -> Self {
        self.compactor = compactor;
        self
    }

    /// Get the session store.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Record `text` as a user turn and produce the assistant reply.
    ///
    /// The user turn stays recorded even when the model call fails.
    ///
    /// # Errors
    ///
    /// Returns the engine error, or [`CompletionError::Malformed`] for an
    /// empty reply. No assistant turn is recorded in that case.
    #[instrument(skip(self, text), fields(model = %self.model.model_id()))]
    pub async fn reply(&self, user: &str, text: &str) -> CompletionResult<String> {
        self.sessions.append_turn(user, TurnRole::User, text).await;

        let context = self.sessions.get_context(user).await;
        debug!(messages = context.len(), "requesting reply");

        let response = self.model.generate(context, self.reply_options).await?;
        if let Some(usage) = response.token_usage {
            debug!(tokens = usage.total(), "reply usage");
        }
        let reply = response.text.trim().to_string();
        if reply.is_empty() {
            return Err(CompletionError::malformed("empty reply"));
        }

        self.sessions
            .append_turn(user, TurnRole::Assistant, reply.clone())
            .await;
        Ok(reply)
    }

    /// Compress older turns into the summary if a compaction is due.
    ///
    /// On failure the session is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns the engine error from the summary request.
    #[instrument(skip(self))]
    pub async fn compact(&self, user: &str) -> CompletionResult<CompactionOutcome> {
        let Some(claim) = self.sessions.claim_compaction(user).await else {
            return Ok(CompactionOutcome::Skipped);
        };

        let summary = match self.compactor.summarize(&claim.turns).await {
            Ok(summary) => summary,
            Err(e) => {
                self.sessions.abort_compaction(user, &claim).await;
                return Err(e);
            }
        };

        if !self.sessions.finish_compaction(user, &summary, &claim).await {
            debug!("session reset during compaction, summary dropped");
            return Ok(CompactionOutcome::Discarded);
        }

        let summary_chars = self
            .sessions
            .get_summary(user)
            .await
            .map_or(0, |s| s.chars().count());
        info!(turns = claim.turns.len(), summary_chars, "session compacted");

        Ok(CompactionOutcome::Compacted {
            turns: claim.turns.len(),
            summary_chars,
        })
    }

    /// Best-effort [`compact`](Self::compact): failures are logged and dropped.
    pub async fn maintain_memory(&self, user: &str) {
        if let Err(e) = self.compact(user).await {
            warn!(user = %user, error = %e, "summary compaction failed");
        }
    }

    /// Reply, then maintain memory before returning.
    ///
    /// # Errors
    ///
    /// Returns the error from [`reply`](Self::reply).
    pub async fn process(&self, user: &str, text: &str) -> CompletionResult<String> {
        let reply = self.reply(user, text).await?;
        self.maintain_memory(user).await;
        Ok(reply)
    }
}
