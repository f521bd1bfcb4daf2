//! Command-line interface channel implementation.
//!
//! Reads lines from standard input and prints replies to standard output.
//! Typing `exit` or `quit`, or closing the input, ends the session and fires
//! the channel's [`closed`](CliChannel::closed) notification.

use crate::bus::MessageBus;
use crate::channel::{Channel, ChannelBase, ChannelState, ChannelStatus};
use crate::error::{ChannelError, ChannelResult};
use crate::events::{InboundMessage, OutboundMessage};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Channel name used for routing.
pub const CHANNEL_NAME: &str = "cli";

type InputReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// CLI channel configuration.
#[derive(Debug, Clone)]
pub struct CliChannelConfig {
    /// Prompt string to display before user input.
    pub prompt: String,
    /// Sender identifier; the console user's session key derives from it.
    pub sender_id: String,
}

impl Default for CliChannelConfig {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            sender_id: "user".to_string(),
        }
    }
}

impl CliChannelConfig {
    /// Create a new CLI channel config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prompt string.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the sender ID.
    #[must_use]
    pub fn sender_id(mut self, id: impl Into<String>) -> Self {
        self.sender_id = id.into();
        self
    }
}

/// Command-line interface channel.
pub struct CliChannel {
    base: Arc<ChannelBase>,
    config: CliChannelConfig,
    input: Mutex<Option<InputReader>>,
    closed: Arc<Notify>,
    tasks: RwLock<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for CliChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliChannel")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CliChannel {
    /// Create a new CLI channel reading standard input.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CliChannelConfig::default())
    }

    /// Create a new CLI channel with the given configuration.
    #[must_use]
    pub fn with_config(config: CliChannelConfig) -> Self {
        Self {
            base: Arc::new(ChannelBase::new(CHANNEL_NAME)),
            config,
            input: Mutex::new(None),
            closed: Arc::new(Notify::new()),
            tasks: RwLock::new(Vec::new()),
        }
    }

    /// Read from `reader` instead of standard input.
    #[must_use]
    pub fn with_input(self, reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(reader))),
            ..self
        }
    }

    /// Notified once the user ends the session.
    #[must_use]
    pub fn closed(&self) -> Arc<Notify> {
        Arc::clone(&self.closed)
    }

    /// Render a reply with its quick replies as a hint line.
    fn render(msg: &OutboundMessage) -> String {
        let hints = msg
            .quick_replies
            .iter()
            .flatten()
            .map(|label| format!("[{label}]"))
            .collect::<Vec<_>>()
            .join(" ");

        if hints.is_empty() {
            format!("\n{}\n", msg.content)
        } else {
            format!("\n{}\n\n{hints}\n", msg.content)
        }
    }

    #[allow(clippy::print_stdout)] // CLI channel intentionally prints to stdout
    fn print(text: &str, prompt: &str) {
        println!("{text}");
        print!("{prompt}");
        let _ = std::io::stdout().flush();
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, bus: &MessageBus) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Starting).await;

        let reader: InputReader = match self.input.lock().await.take() {
            Some(reader) => reader,
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };

        // Output: replies routed to this channel.
        let mut outbound_rx = bus.subscribe_channel(CHANNEL_NAME).await;
        let prompt = self.config.prompt.clone();
        let output_base = Arc::clone(&self.base);
        let output = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                Self::print(&Self::render(&msg), &prompt);
                output_base.record_sent().await;
            }
            debug!("CLI output handler finished");
        });

        // Input: one inbound message per non-empty line.
        let bus_handle = bus.inbound_handle();
        let sender_id = self.config.sender_id.clone();
        let prompt = self.config.prompt.clone();
        let input_base = Arc::clone(&self.base);
        let closed = Arc::clone(&self.closed);
        let input = tokio::spawn(async move {
            Self::print("", &prompt);
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        input_base.record_error(e.to_string()).await;
                        break;
                    }
                };

                let trimmed = line.trim();
                if matches!(trimmed, "exit" | "quit") {
                    break;
                }
                if trimmed.is_empty() {
                    Self::print("", &prompt);
                    continue;
                }

                let msg = InboundMessage::new(CHANNEL_NAME, sender_id.as_str(), "direct", trimmed);
                input_base.record_received().await;
                if let Err(e) = bus_handle.publish(msg).await {
                    error!(error = %e, "failed to publish CLI message to bus");
                    break;
                }
            }
            debug!("CLI input finished");
            closed.notify_one();
        });

        self.tasks.write().await.extend([output, input]);
        self.base.set_state(ChannelState::Running).await;
        info!("CLI channel started");

        Ok(())
    }

    async fn stop(&self) -> ChannelResult<()> {
        self.base.set_state(ChannelState::Stopping).await;

        for task in self.tasks.write().await.drain(..) {
            task.abort();
        }

        self.base.set_state(ChannelState::Stopped).await;
        info!("CLI channel stopped");

        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> ChannelResult<()> {
        if self.base.state().await != ChannelState::Running {
            return Err(ChannelError::NotConnected);
        }
        Self::print(&Self::render(msg), &self.config.prompt);
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
    use std::time::Duration;

    #[tokio::test]
    async fn test_cli_channel_relays_lines_until_exit() {
        let bus = MessageBus::new();
        let channel = CliChannel::new().with_input(b"hello\n\n  /summary \nexit\nignored\n".as_slice());
        let closed = channel.closed();

        channel.start(&bus).await.unwrap();
        assert!(channel.is_running().await);

        let first = bus.consume_inbound().await.unwrap();
        assert_eq!(first.content, "hello");
        assert_eq!(first.session_key(), "cli:user");
        assert!(!first.is_command);

        let second = bus.consume_inbound().await.unwrap();
        assert_eq!(second.content, "/summary");
        assert!(second.is_command);

        tokio::time::timeout(Duration::from_secs(1), closed.notified())
            .await
            .unwrap();
        assert!(
            bus.consume_inbound_timeout(Duration::from_millis(50))
                .await
                .is_none()
        );

        channel.stop().await.unwrap();
        let status = channel.status().await;
        assert_eq!(status.state, ChannelState::Stopped);
        assert_eq!(status.messages_received, 2);
    }

    #[test]
    fn test_render_quick_replies() {
        let msg = OutboundMessage::new(CHANNEL_NAME, "direct", "reply")
            .with_quick_replies(crate::commands::quick_replies());
        assert_eq!(
            CliChannel::render(&msg),
            "\nreply\n\n[/mirror] [/reset] [/summary]\n"
        );

        let bare = OutboundMessage::new(CHANNEL_NAME, "direct", "plain");
        assert_eq!(CliChannel::render(&bare), "\nplain\n");
    }

    #[test]
    fn test_config_builder() {
        let config = CliChannelConfig::new().prompt(">> ").sender_id("tester");
        assert_eq!(config.prompt, ">> ");
        assert_eq!(config.sender_id, "tester");
    }
}
