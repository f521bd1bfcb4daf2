//! Process-wide session store.
//!
//! Owns the map from user key to [`Session`]. Nothing is persisted; a
//! session lives until the user resets it or the process exits.

use super::context::ContextBuilder;
use super::types::{Session, Turn, TurnRole};
use crate::error::{ConfigError, ConfigResult};
use crate::providers::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Limits of the per-user memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of stored turns.
    pub max_turns: usize,
    /// Turns since the last compaction that trigger a new one.
    pub compaction_threshold: usize,
    /// Number of most recent turns sent for compaction.
    pub compaction_window: usize,
    /// Turns kept after a successful compaction.
    pub retain_after_compaction: usize,
    /// Optional cap on summary length, in characters. `None` keeps everything.
    pub summary_max_chars: Option<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            compaction_threshold: 10,
            compaction_window: 10,
            retain_after_compaction: 6,
            summary_max_chars: None,
        }
    }
}

impl MemoryConfig {
    /// Check that the limits are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_turns == 0 {
            return Err(ConfigError::invalid("memory.max_turns must be at least 1"));
        }
        if self.compaction_threshold == 0 {
            return Err(ConfigError::invalid(
                "memory.compaction_threshold must be at least 1",
            ));
        }
        if self.compaction_window == 0 {
            return Err(ConfigError::invalid(
                "memory.compaction_window must be at least 1",
            ));
        }
        if self.retain_after_compaction > self.max_turns {
            return Err(ConfigError::invalid(format!(
                "memory.retain_after_compaction ({}) exceeds memory.max_turns ({})",
                self.retain_after_compaction, self.max_turns
            )));
        }
        if self.summary_max_chars == Some(0) {
            return Err(ConfigError::invalid(
                "memory.summary_max_chars must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

/// Turns handed out for compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionClaim {
    /// Most recent turns, oldest first.
    pub turns: Vec<Turn>,
    /// Pending turn count when the claim was taken.
    pub pending: usize,
    /// Epoch of the session the claim was taken from.
    pub epoch: u64,
}

/// Session store keyed by user.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    next_epoch: AtomicU64,
    config: MemoryConfig,
    context: ContextBuilder,
}

impl SessionStore {
    /// Create a store with the given limits and prompts.
    #[must_use]
    pub fn new(config: MemoryConfig, context: ContextBuilder) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(0),
            config,
            context,
        }
    }

    /// Create a store with custom limits and the default prompts.
    #[must_use]
    pub fn with_config(config: MemoryConfig) -> Self {
        Self::new(config, ContextBuilder::default())
    }

    /// Get the memory limits.
    #[must_use]
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Request context for `user`: instruction, summary if any, then turns.
    pub async fn get_context(&self, user: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.read().await;
        match sessions.get(user) {
            Some(session) => self.context.build_messages(&session.summary, &session.turns),
            None => self.context.build_messages("", &[]),
        }
    }

    /// Append a turn, creating the session on first use.
    pub async fn append_turn(&self, user: &str, role: TurnRole, text: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user.to_string()).or_insert_with(|| {
            let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
            debug!(user = %user, epoch, "created new session");
            Session {
                epoch,
                ..Session::default()
            }
        });
        session.push_turn(Turn::new(role, text), self.config.max_turns);
    }

    /// Remove the session. Returns whether one existed.
    pub async fn reset(&self, user: &str) -> bool {
        let removed = self.sessions.write().await.remove(user).is_some();
        if removed {
            info!(user = %user, "session reset");
        }
        removed
    }

    /// Stored summary, `None` when absent or empty.
    pub async fn get_summary(&self, user: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(user)
            .map(|s| s.summary.clone())
            .filter(|s| !s.is_empty())
    }

    /// Stored turns, oldest first.
    pub async fn turns(&self, user: &str) -> Vec<Turn> {
        self.sessions
            .read()
            .await
            .get(user)
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the whole session.
    pub async fn session(&self, user: &str) -> Option<Session> {
        self.sessions.read().await.get(user).cloned()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session exists.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Take the turns to compress if a compaction is due.
    ///
    /// Returns `None` when the session is missing, below the threshold, or
    /// already compacting. Otherwise marks it as compacting until
    /// [`finish_compaction`](Self::finish_compaction) or
    /// [`abort_compaction`](Self::abort_compaction) is called.
    pub async fn claim_compaction(&self, user: &str) -> Option<CompactionClaim> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(user)?;

        if session.compacting
            || session.turns.is_empty()
            || session.pending_turns < self.config.compaction_threshold
        {
            return None;
        }

        session.compacting = true;
        let start = session
            .turns
            .len()
            .saturating_sub(self.config.compaction_window);

        Some(CompactionClaim {
            turns: session.turns[start..].to_vec(),
            pending: session.pending_turns,
            epoch: session.epoch,
        })
    }

    /// Apply a successful compaction.
    ///
    /// Appends `summary` to the stored summary and trims the turns. Returns
    /// `false` if the session was reset while the compaction ran, even when
    /// a new session has been started since.
    pub async fn finish_compaction(
        &self,
        user: &str,
        summary: &str,
        claim: &CompactionClaim,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions
            .get_mut(user)
            .filter(|s| s.epoch == claim.epoch)
        else {
            return false;
        };

        session.append_summary(summary, self.config.summary_max_chars);
        session.retain_last(self.config.retain_after_compaction);
        session.pending_turns = session.pending_turns.saturating_sub(claim.pending);
        session.compacting = false;
        true
    }

    /// Release a claim without touching summary or turns.
    ///
    /// Returns `false` if the claimed session no longer exists.
    pub async fn abort_compaction(&self, user: &str, claim: &CompactionClaim) -> bool {
        match self.sessions.write().await.get_mut(user) {
            Some(session) if session.epoch == claim.epoch => {
                session.compacting = false;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;

    fn store() -> SessionStore {
        SessionStore::new(
            MemoryConfig::default(),
            ContextBuilder::new()
                .with_system_prompt("mirror")
                .with_summary_label("memory: "),
        )
    }

    async fn exchange(store: &SessionStore, user: &str, from: usize, n: usize) {
        for i in from..from + n {
            store.append_turn(user, TurnRole::User, format!("q{i}")).await;
            store
                .append_turn(user, TurnRole::Assistant, format!("a{i}"))
                .await;
        }
    }

    #[tokio::test]
    async fn test_turn_count_never_exceeds_max() {
        let store = store();
        for i in 0..25 {
            let role = if i % 2 == 0 {
                TurnRole::User
            } else {
                TurnRole::Assistant
            };
            store.append_turn("u", role, i.to_string()).await;
            assert!(store.turns("u").await.len() <= 8);
        }
        assert_eq!(store.turns("u").await.last().unwrap().content, "24");
    }

    #[tokio::test]
    async fn test_reset_leaves_only_instruction() {
        let store = store();
        exchange(&store, "u", 0, 2).await;
        assert!(store.reset("u").await);

        let context = store.get_context("u").await;
        assert_eq!(context, vec![ChatMessage::system("mirror")]);
        assert!(store.get_summary("u").await.is_none());

        // Resetting again is fine.
        assert!(!store.reset("u").await);
    }

    #[tokio::test]
    async fn test_context_order_with_summary() {
        let store = SessionStore::new(
            MemoryConfig {
                compaction_threshold: 3,
                retain_after_compaction: 3,
                ..MemoryConfig::default()
            },
            ContextBuilder::new()
                .with_system_prompt("mirror")
                .with_summary_label("memory: "),
        );
        for (role, text) in [
            (TurnRole::User, "one"),
            (TurnRole::Assistant, "two"),
            (TurnRole::User, "three"),
        ] {
            store.append_turn("v", role, text).await;
        }
        let claim = store.claim_compaction("v").await.unwrap();
        assert!(store.finish_compaction("v", "pattern", &claim).await);

        let context = store.get_context("v").await;
        assert_eq!(context.len(), 5);
        assert_eq!(context[0], ChatMessage::system("mirror"));
        assert_eq!(context[1], ChatMessage::system("memory: pattern"));
        assert_eq!(context[2], ChatMessage::user("one"));
        assert_eq!(context[3], ChatMessage::assistant("two"));
        assert_eq!(context[4].role, Role::User);
        assert_eq!(context[4].content, "three");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = store();
        store.append_turn("a", TurnRole::User, "hello").await;
        store.append_turn("b", TurnRole::User, "bonjour").await;
        store.reset("a").await;

        assert!(store.turns("a").await.is_empty());
        assert_eq!(store.turns("b").await, vec![Turn::user("bonjour")]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_claim_requires_threshold() {
        let store = store();
        exchange(&store, "u", 0, 4).await;
        assert!(store.claim_compaction("u").await.is_none());
        assert!(store.claim_compaction("missing").await.is_none());

        exchange(&store, "u", 4, 1).await;
        let claim = store.claim_compaction("u").await.unwrap();
        assert_eq!(claim.pending, 10);
        assert_eq!(claim.turns.len(), 8);
        assert_eq!(claim.turns.last().unwrap().content, "a4");

        // A second claim while the first is in flight is refused.
        assert!(store.claim_compaction("u").await.is_none());
    }

    #[tokio::test]
    async fn test_finish_compaction_trims_and_appends() {
        let store = store();
        exchange(&store, "u", 0, 5).await;

        let claim = store.claim_compaction("u").await.unwrap();
        assert!(store.finish_compaction("u", "first", &claim).await);
        let session = store.session("u").await.unwrap();
        assert_eq!(session.summary(), "first");
        assert_eq!(session.turns().len(), 6);
        assert_eq!(session.pending_turns(), 0);
        assert!(!session.is_compacting());

        exchange(&store, "u", 5, 5).await;
        let claim = store.claim_compaction("u").await.unwrap();
        assert!(store.finish_compaction("u", "second", &claim).await);
        let summary = store.get_summary("u").await.unwrap();
        assert_eq!(summary, "first\nsecond");
        assert!(summary.starts_with("first"));
    }

    #[tokio::test]
    async fn test_abort_leaves_state_untouched() {
        let store = store();
        exchange(&store, "u", 0, 5).await;
        let before = store.turns("u").await;

        let claim = store.claim_compaction("u").await.unwrap();
        assert!(store.abort_compaction("u", &claim).await);

        let session = store.session("u").await.unwrap();
        assert_eq!(session.turns(), before.as_slice());
        assert_eq!(session.summary(), "");
        assert_eq!(session.pending_turns(), claim.pending);
        assert!(!session.is_compacting());
    }

    #[tokio::test]
    async fn test_reset_during_compaction_wins() {
        let store = store();
        exchange(&store, "u", 0, 5).await;
        let claim = store.claim_compaction("u").await.unwrap();

        store.reset("u").await;
        assert!(!store.finish_compaction("u", "late", &claim).await);
        assert!(store.session("u").await.is_none());
    }

    #[tokio::test]
    async fn test_reset_then_new_message_drops_stale_summary() {
        let store = store();
        exchange(&store, "u", 0, 5).await;
        let claim = store.claim_compaction("u").await.unwrap();

        store.reset("u").await;
        store.append_turn("u", TurnRole::User, "fresh start").await;

        assert!(!store.finish_compaction("u", "old summary", &claim).await);
        assert!(store.get_summary("u").await.is_none());
        let session = store.session("u").await.unwrap();
        assert_eq!(session.turns(), [Turn::user("fresh start")].as_slice());
        assert_eq!(session.pending_turns(), 1);
        assert_ne!(session.epoch(), claim.epoch);

        assert!(!store.abort_compaction("u", &claim).await);
        assert_eq!(
            store.get_context("u").await,
            vec![ChatMessage::system("mirror"), ChatMessage::user("fresh start")]
        );
    }

    #[test]
    fn test_memory_config_validation() {
        assert!(MemoryConfig::default().validate().is_ok());

        let bad = MemoryConfig {
            retain_after_compaction: 9,
            ..MemoryConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid(_))));

        let zero = MemoryConfig {
            max_turns: 0,
            ..MemoryConfig::default()
        };
        assert!(zero.validate().is_err());
    }
}
