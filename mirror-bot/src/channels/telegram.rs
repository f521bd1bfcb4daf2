//! Telegram channel implementation using teloxide.
//!
//! Long-polls the Bot API for text messages and publishes them to the bus.
//! Replies are sent as plain text with a reply keyboard built from the
//! message's quick replies.
//!
//! # Setup
//!
//! 1. Create a bot via [@BotFather](https://t.me/botfather)
//! 2. Export the token as `BOT_TOKEN`
//!
//! # Example
//!
//! ```rust,ignore
//! use mirror_bot::channels::{TelegramChannel, telegram::TelegramChannelConfig};
//! use mirror_bot::bus::MessageBus;
//!
//! let bus = MessageBus::new();
//! let telegram = TelegramChannel::new(TelegramChannelConfig::new("123:ABC"));
//! telegram.start(&bus).await?;
//! ```

use crate::bus::MessageBus;
use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus};
use crate::config::{TELEGRAM_MAX_MESSAGE_LENGTH, TelegramConfig};
use crate::error::{ChannelError, ChannelResult, ConfigError};
use crate::events::{InboundMessage, OutboundMessage};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Channel name used for routing.
pub const CHANNEL_NAME: &str = "telegram";

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramChannelConfig {
    /// Bot token from @BotFather.
    pub token: String,
    /// Maximum message length before splitting.
    pub max_message_length: usize,
}

impl std::fmt::Debug for TelegramChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannelConfig")
            .field("token", &"<redacted>")
            .field("max_message_length", &self.max_message_length)
            .finish()
    }
}

impl TelegramChannelConfig {
    /// Create a new Telegram channel config with the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            max_message_length: TELEGRAM_MAX_MESSAGE_LENGTH,
        }
    }

    /// Build from the bot configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no token is configured.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ConfigError> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| ConfigError::missing("telegram bot token"))?;
        Ok(Self::new(token).max_message_length(config.max_message_length))
    }

    /// Set the maximum message length.
    #[must_use]
    pub const fn max_message_length(mut self, len: usize) -> Self {
        self.max_message_length = len;
        self
    }
}

/// Telegram channel implementation.
pub struct TelegramChannel {
    base: Arc<ChannelBase>,
    config: TelegramChannelConfig,
    bot: RwLock<Option<Bot>>,
    tasks: RwLock<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Create a new Telegram channel with the given configuration.
    #[must_use]
    pub fn new(config: TelegramChannelConfig) -> Self {
        Self {
            base: Arc::new(ChannelBase::new(CHANNEL_NAME)),
            config,
            bot: RwLock::new(None),
            tasks: RwLock::new(Vec::new()),
        }
    }

    /// Send one outbound message, split into chunks as needed.
    ///
    /// The keyboard is attached to the last chunk only.
    async fn deliver(bot: &Bot, msg: &OutboundMessage, max_len: usize) -> ChannelResult<()> {
        let chat_id: i64 = msg
            .chat_id
            .parse()
            .map_err(|_| ChannelError::send(format!("invalid chat ID: {}", msg.chat_id)))?;

        let chunks = split_message(&msg.content, max_len);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let request = bot.send_message(ChatId(chat_id), chunk);
            let result = match keyboard(&msg.quick_replies) {
                Some(markup) if i == last => request.reply_markup(markup).await,
                _ => request.await,
            };
            result.map_err(|e| ChannelError::send(e.to_string()))?;
        }
        Ok(())
    }
}

/// Build a resizable reply keyboard. `None` for an empty layout.
fn keyboard(rows: &[Vec<String>]) -> Option<KeyboardMarkup> {
    if rows.iter().all(Vec::is_empty) {
        return None;
    }
    let rows = rows
        .iter()
        .filter(|row| !row.is_empty())
        .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>());
    Some(KeyboardMarkup::new(rows).resize_keyboard())
}

/// Split `text` into chunks of at most `max_len` bytes.
///
/// Breaks on line boundaries where possible and never inside a character.
/// Blank lines survive; only the newline a chunk ends on is consumed.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    // Whether `current` holds at least one line, possibly an empty one.
    let mut open = false;

    for line in text.split('\n') {
        if open && current.len() + 1 + line.len() > max_len {
            chunks.push(std::mem::take(&mut current));
            open = false;
        }
        if open {
            current.push('\n');
        }
        open = true;

        if line.len() > max_len {
            for ch in line.chars() {
                if !current.is_empty() && current.len() + ch.len_utf8() > max_len {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push(ch);
            }
            continue;
        }
        current.push_str(line);
    }

    if open {
        chunks.push(current);
    }
    chunks.retain(|chunk| !chunk.trim().is_empty());
    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, bus: &MessageBus) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Starting).await;

        let bot = Bot::new(&self.config.token);
        let me = match bot.get_me().await {
            Ok(me) => me,
            Err(e) => {
                self.base.set_state(ChannelState::Error).await;
                self.base.record_error(e.to_string()).await;
                return Err(ChannelError::start(format!("telegram auth failed: {e}")));
            }
        };
        *self.bot.write().await = Some(bot.clone());

        // Outbound: replies routed to this channel.
        let mut outbound_rx = bus.subscribe_channel(CHANNEL_NAME).await;
        let output_bot = bot.clone();
        let output_base = Arc::clone(&self.base);
        let max_len = self.config.max_message_length;
        let output = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                match Self::deliver(&output_bot, &msg, max_len).await {
                    Ok(()) => output_base.record_sent().await,
                    Err(e) => output_base.record_error(e.to_string()).await,
                }
            }
            debug!("telegram output handler finished");
        });

        // Inbound: text messages only.
        let bus_handle = bus.inbound_handle();
        let input_base = Arc::clone(&self.base);
        let handler = Update::filter_message().endpoint(move |_bot: Bot, msg: Message| {
            let bus_handle = bus_handle.clone();
            let base = Arc::clone(&input_base);

            async move {
                let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
                    debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
                    return Ok::<(), teloxide::RequestError>(());
                };

                let inbound = InboundMessage::new(
                    CHANNEL_NAME,
                    user.id.0.to_string(),
                    msg.chat.id.0.to_string(),
                    text,
                );

                base.record_received().await;
                if let Err(e) = bus_handle.publish(inbound).await {
                    error!(error = %e, "failed to publish telegram message to bus");
                }
                Ok(())
            }
        });

        let mut dispatcher = Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build();
        let polling = tokio::spawn(async move {
            dispatcher.dispatch().await;
        });

        self.tasks.write().await.extend([output, polling]);
        self.base.set_state(ChannelState::Running).await;
        info!(bot = %me.user.username.as_deref().unwrap_or_default(), "telegram polling started");

        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopping).await;

        for task in self.tasks.write().await.drain(..) {
            task.abort();
        }
        *self.bot.write().await = None;

        self.base.set_state(ChannelState::Stopped).await;
        info!("telegram channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> ChannelResult<()> {
        let bot = self.bot.read().await;
        let bot = bot.as_ref().ok_or(ChannelError::NotConnected)?;

        Self::deliver(bot, msg, self.config.max_message_length).await?;
        self.base.record_sent().await;
        Ok(())
    }

    async fn status(&self) -> ChannelStatus {
        self.base.build_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_message() {
        let short = "Hello, world!";
        assert_eq!(split_message(short, 100), vec![short.to_string()]);

        let long = "Line 1\nLine 2\nLine 3\nLine 4";
        assert_eq!(
            split_message(long, 15),
            vec!["Line 1\nLine 2".to_string(), "Line 3\nLine 4".to_string()]
        );
    }

    #[test]
    fn test_split_keeps_blank_lines_and_trailing_newline() {
        let text = "aaaaa\n\nbbb";
        let chunks = split_message(text, 5);
        assert_eq!(chunks, vec!["aaaaa", "\nbbb"]);
        assert_eq!(chunks.join("\n"), text);

        let trailing = "aaaaa\nbb\n";
        let chunks = split_message(trailing, 5);
        assert_eq!(chunks, vec!["aaaaa", "bb\n"]);
        assert_eq!(chunks.join("\n"), trailing);

        assert_eq!(split_message("aaaaa\n", 5), vec!["aaaaa"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let chunks = split_message("ааааа", 4);
        assert_eq!(chunks, vec!["аа", "аа", "а"]);
        assert!(chunks.iter().all(|c| c.len() <= 4));
    }

    #[test]
    fn test_keyboard_layout() {
        assert!(keyboard(&[]).is_none());
        assert!(keyboard(&[Vec::new()]).is_none());

        let markup = keyboard(&crate::commands::quick_replies()).unwrap();
        assert_eq!(markup.keyboard.len(), 2);
        assert_eq!(markup.keyboard[0][0].text, "/mirror");
        assert_eq!(markup.keyboard[1][0].text, "/summary");
    }

    #[test]
    fn test_config_from_bot_config() {
        let missing = TelegramConfig::default();
        assert!(TelegramChannelConfig::from_config(&missing).is_err());

        let config = TelegramConfig {
            token: Some("123:abc".to_string()),
            max_message_length: 1000,
        };
        let channel_config = TelegramChannelConfig::from_config(&config).unwrap();
        assert_eq!(channel_config.max_message_length, 1000);
        assert!(!format!("{channel_config:?}").contains("123:abc"));
    }

    #[tokio::test]
    async fn test_send_requires_start() {
        let channel = TelegramChannel::new(TelegramChannelConfig::new("123:abc"));
        let msg = OutboundMessage::new(CHANNEL_NAME, "1", "hi");
        assert!(matches!(
            channel.send(&msg).await,
            Err(ChannelError::NotConnected)
        ));
        assert_eq!(channel.status().await.state, ChannelState::Stopped);
    }
}
