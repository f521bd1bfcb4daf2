//! Chat commands and their canned replies.
//!
//! Commands start with `/` and may carry a `@botname` suffix, as Telegram
//! appends in group chats. Names are case-sensitive. Arguments after the
//! name are ignored.

use crate::session::SessionStore;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Reply to `/start`.
pub const START_TEXT: &str = "AI-MIRROR online.

Пиши ситуацию — я отзеркалю процесс мышления.
Команды:
/mirror — режим зеркала (по умолчанию)
/summary — показать текущую память
/reset — стереть память
";

/// Reply to `/reset`.
pub const RESET_TEXT: &str = "Память очищена.";

/// Header of the `/summary` reply.
pub const SUMMARY_HEADER: &str = "Текущее саммари:";

/// Shown by `/summary` while the summary is empty.
pub const EMPTY_SUMMARY: &str = "(пока пусто)";

/// Reply to `/mirror`.
pub const MIRROR_TEXT: &str =
    "Ок. Опиши ситуацию 2–10 предложениями: что произошло, что ты чувствуешь, что хочешь сделать.";

/// Recognized commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotCommand {
    /// Greeting and command list.
    Start,
    /// Forget everything about the user.
    Reset,
    /// Show the stored summary.
    Summary,
    /// Invite the user to describe a situation.
    Mirror,
}

impl BotCommand {
    /// All commands, in menu order.
    pub const ALL: [Self; 4] = [Self::Start, Self::Mirror, Self::Summary, Self::Reset];

    /// Command name without the leading slash.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Reset => "reset",
            Self::Summary => "summary",
            Self::Mirror => "mirror",
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

impl FromStr for BotCommand {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|c| c.name() == name).ok_or(())
    }
}

/// Classified inbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    /// A recognized command.
    Command(BotCommand),
    /// A slash command this bot does not handle. Holds the bare name.
    UnknownCommand(&'a str),
    /// Conversational text, trimmed. May be empty.
    Text(&'a str),
}

impl<'a> Input<'a> {
    /// Classify raw message text.
    #[must_use]
    pub fn parse(text: &'a str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Self::Text(text);
        };

        let token = rest.split_whitespace().next().unwrap_or_default();
        let name = token.split('@').next().unwrap_or_default();

        name.parse::<BotCommand>()
            .map_or(Self::UnknownCommand(name), Self::Command)
    }
}

/// Quick-reply layout attached to every reply.
#[must_use]
pub fn quick_replies() -> Vec<Vec<String>> {
    vec![
        vec![BotCommand::Mirror.to_string(), BotCommand::Reset.to_string()],
        vec![BotCommand::Summary.to_string()],
    ]
}

/// Answers commands from the session store.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    sessions: Arc<SessionStore>,
}

impl CommandRouter {
    /// Create a router over the given store.
    #[must_use]
    pub const fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    /// Run a command for `user` and return the reply text.
    pub async fn handle(&self, user: &str, command: BotCommand) -> String {
        debug!(user = %user, command = %command, "handling command");
        match command {
            BotCommand::Start => START_TEXT.to_string(),
            BotCommand::Reset => {
                self.sessions.reset(user).await;
                RESET_TEXT.to_string()
            }
            BotCommand::Summary => {
                let summary = self.sessions.get_summary(user).await;
                format!(
                    "{SUMMARY_HEADER}\n{}",
                    summary.as_deref().unwrap_or(EMPTY_SUMMARY)
                )
            }
            BotCommand::Mirror => MIRROR_TEXT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryConfig, TurnRole};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Input::parse("/start"), Input::Command(BotCommand::Start));
        assert_eq!(
            Input::parse("  /summary@mirror_bot  "),
            Input::Command(BotCommand::Summary)
        );
        assert_eq!(
            Input::parse("/reset please"),
            Input::Command(BotCommand::Reset)
        );
        assert_eq!(Input::parse("/help"), Input::UnknownCommand("help"));
        assert_eq!(Input::parse("/Start"), Input::UnknownCommand("Start"));
        assert_eq!(Input::parse("/"), Input::UnknownCommand(""));
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(Input::parse("  hello  "), Input::Text("hello"));
        assert_eq!(Input::parse("a /start b"), Input::Text("a /start b"));
        assert_eq!(Input::parse("   "), Input::Text(""));
    }

    #[test]
    fn test_quick_reply_layout() {
        assert_eq!(
            quick_replies(),
            vec![
                vec!["/mirror".to_string(), "/reset".to_string()],
                vec!["/summary".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_and_reset_replies() {
        let sessions = Arc::new(SessionStore::with_config(MemoryConfig {
            compaction_threshold: 1,
            ..MemoryConfig::default()
        }));
        let router = CommandRouter::new(Arc::clone(&sessions));

        assert_eq!(
            router.handle("u", BotCommand::Summary).await,
            "Текущее саммари:\n(пока пусто)"
        );

        sessions.append_turn("u", TurnRole::User, "hi").await;
        let claim = sessions.claim_compaction("u").await.unwrap();
        sessions.finish_compaction("u", "tea lover", &claim).await;
        assert_eq!(
            router.handle("u", BotCommand::Summary).await,
            "Текущее саммари:\ntea lover"
        );

        assert_eq!(router.handle("u", BotCommand::Reset).await, RESET_TEXT);
        assert!(sessions.session("u").await.is_none());
        assert!(router.handle("u", BotCommand::Start).await.starts_with("AI-MIRROR online."));
    }
}
