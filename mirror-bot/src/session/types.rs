//! Per-user conversation state.

use crate::providers::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Speaker of a stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The person talking to the bot.
    User,
    /// The bot's generated reply.
    Assistant,
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Self::User,
            TurnRole::Assistant => Self::Assistant,
        }
    }
}

/// One role-tagged message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who said it.
    pub role: TurnRole,
    /// What was said.
    pub content: String,
}

impl Turn {
    /// Create a new turn.
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Convert into a completion request message.
    #[must_use]
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role.into(), self.content.clone())
    }
}

/// Conversation state of a single user.
///
/// `turns` never holds more than the configured maximum; `pending_turns`
/// keeps counting past that bound until the next successful compaction.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub(super) summary: String,
    pub(super) turns: Vec<Turn>,
    pub(super) pending_turns: usize,
    pub(super) compacting: bool,
    pub(super) epoch: u64,
}

impl Session {
    /// Rolling summary, empty until the first compaction.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Stored turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns appended since the last successful compaction.
    #[must_use]
    pub const fn pending_turns(&self) -> usize {
        self.pending_turns
    }

    /// Whether a compaction for this session is in flight.
    #[must_use]
    pub const fn is_compacting(&self) -> bool {
        self.compacting
    }

    /// Store-assigned generation; a session recreated after a reset gets a new one.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Append a turn and drop the oldest ones beyond `max_turns`.
    pub(super) fn push_turn(&mut self, turn: Turn, max_turns: usize) {
        self.turns.push(turn);
        self.pending_turns += 1;
        self.retain_last(max_turns);
    }

    /// Keep only the newest `n` turns.
    pub(super) fn retain_last(&mut self, n: usize) {
        if self.turns.len() > n {
            let excess = self.turns.len() - n;
            self.turns.drain(..excess);
        }
    }

    /// Append a compaction result to the summary.
    ///
    /// Prior content is kept; the result is newline-joined and the whole
    /// summary trimmed. With `max_chars` set only the newest characters stay.
    pub(super) fn append_summary(&mut self, text: &str, max_chars: Option<usize>) {
        let joined = if self.summary.is_empty() {
            text.trim().to_string()
        } else {
            format!("{}\n{}", self.summary, text).trim().to_string()
        };

        self.summary = match max_chars {
            Some(max) => keep_tail_chars(&joined, max),
            None => joined,
        };
    }
}

/// Keep the last `max` characters of `text`.
fn keep_tail_chars(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    text.chars().skip(total - max).collect::<String>().trim_start().to_string()
}
