//! Agent loop runner - the core message processing engine.

use super::processor::TurnProcessor;
use crate::bus::MessageBus;
use crate::commands::{CommandRouter, Input, quick_replies};
use crate::error::Result;
use crate::events::{InboundMessage, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// How long one wait on the inbound queue lasts before re-checking `running`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consumes inbound messages, answers them and publishes the replies.
///
/// Commands are answered from the session store. Conversational text goes
/// through the [`TurnProcessor`]; once the reply is published, memory
/// maintenance runs as a detached task.
pub struct AgentLoop {
    bus: MessageBus,
    processor: Arc<TurnProcessor>,
    commands: CommandRouter,
    running: Arc<RwLock<bool>>,
    poll_interval: Duration,
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("processor", &self.processor)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl AgentLoop {
    /// Create a new agent loop.
    #[must_use]
    pub fn new(bus: MessageBus, processor: Arc<TurnProcessor>) -> Self {
        Self {
            commands: CommandRouter::new(Arc::clone(processor.sessions())),
            bus,
            processor,
            running: Arc::new(RwLock::new(false)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set how often the loop re-checks for a stop request while idle.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the turn processor.
    #[must_use]
    pub const fn processor(&self) -> &Arc<TurnProcessor> {
        &self.processor
    }

    /// Run the agent loop until [`stop`](Self::stop) is called.
    ///
    /// A failure on one message is logged and does not end the loop.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok` once stopped.
    pub async fn run(&self) -> Result<()> {
        *self.running.write().await = true;
        info!("agent loop started");

        while *self.running.read().await {
            let Some(msg) = self.bus.consume_inbound_timeout(self.poll_interval).await else {
                continue;
            };

            if let Err(e) = self.handle_message(&msg).await {
                error!(
                    channel = %msg.channel,
                    user = %msg.sender_id,
                    error = %e,
                    "failed to process message"
                );
            }
        }

        info!("agent loop stopped");
        Ok(())
    }

    /// Stop the agent loop.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Check if the loop is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Answer one inbound message.
    ///
    /// Unknown commands and blank text are ignored.
    ///
    /// # Errors
    ///
    /// Returns the engine error when no reply could be produced; nothing is
    /// published in that case.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<()> {
        let user = msg.session_key();
        let input = if msg.is_command {
            Input::parse(&msg.content)
        } else {
            Input::Text(msg.content.trim())
        };

        match input {
            Input::Command(command) => {
                let reply = self.commands.handle(&user, command).await;
                self.publish_reply(msg, reply).await
            }
            Input::UnknownCommand(name) => {
                debug!(user = %user, command = %name, "ignoring unknown command");
                Ok(())
            }
            Input::Text("") => {
                debug!(user = %user, "ignoring empty message");
                Ok(())
            }
            Input::Text(text) => {
                let reply = self.processor.reply(&user, text).await?;
                self.publish_reply(msg, reply).await?;

                let processor = Arc::clone(&self.processor);
                tokio::spawn(async move {
                    processor.maintain_memory(&user).await;
                });
                Ok(())
            }
        }
    }

    async fn publish_reply(&self, msg: &InboundMessage, reply: String) -> Result<()> {
        let outbound = OutboundMessage::reply_to(msg, reply).with_quick_replies(quick_replies());
        self.bus.publish_outbound(outbound).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::RESET_TEXT;
    use crate::config::GenerationConfig;
    use crate::providers::MockModel;
    use crate::session::SessionStore;

    fn agent(mock: &MockModel) -> (MessageBus, AgentLoop) {
        let bus = MessageBus::new();
        let processor = Arc::new(TurnProcessor::new(
            Arc::new(SessionStore::default()),
            Arc::new(mock.clone()),
            &GenerationConfig::default(),
        ));
        let agent = AgentLoop::new(bus.clone(), processor)
            .with_poll_interval(Duration::from_millis(20));
        (bus, agent)
    }

    #[tokio::test]
    async fn test_text_reply_carries_quick_replies() {
        let mock = MockModel::new("mock");
        mock.push_response("reflection");
        let (bus, agent) = agent(&mock);
        let mut rx = bus.subscribe_channel("cli").await;

        let inbound = InboundMessage::cli("  something happened  ");
        agent.handle_message(&inbound).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.content, "reflection");
        assert_eq!(reply.chat_id, "direct");
        assert_eq!(reply.reply_to.as_deref(), Some(inbound.id.as_str()));
        assert_eq!(reply.quick_replies, quick_replies());

        let turns = agent.processor().sessions().turns("cli:user").await;
        assert_eq!(turns[0].content, "something happened");
    }

    #[tokio::test]
    async fn test_reply_failure_publishes_nothing() {
        let mock = MockModel::new("mock");
        mock.push_error("engine down");
        let (bus, agent) = agent(&mock);
        let mut rx = bus.subscribe_channel("cli").await;

        assert!(agent.handle_message(&InboundMessage::cli("hi")).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_commands_and_ignored_input() {
        let mock = MockModel::new("mock");
        let (bus, agent) = agent(&mock);
        let mut rx = bus.subscribe_channel("cli").await;

        agent.handle_message(&InboundMessage::cli("/help")).await.unwrap();
        agent.handle_message(&InboundMessage::cli("   ")).await.unwrap();
        assert!(rx.try_recv().is_err());

        agent.handle_message(&InboundMessage::cli("/reset")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().content, RESET_TEXT);

        agent.handle_message(&InboundMessage::cli("/summary")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "Текущее саммари:\n(пока пусто)");
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_maintained_after_reply() {
        let mock = MockModel::new("mock").with_fallback("digest");
        let (bus, agent) = agent(&mock);
        let mut rx = bus.subscribe_channel("cli").await;

        for i in 0..5 {
            agent
                .handle_message(&InboundMessage::cli(format!("m{i}")))
                .await
                .unwrap();
            rx.recv().await.unwrap();
        }

        let sessions = Arc::clone(agent.processor().sessions());
        let summary = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(summary) = sessions.get_summary("cli:user").await {
                    return summary;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(summary, "digest");
        assert_eq!(sessions.turns("cli:user").await.len(), 6);
    }

    #[tokio::test]
    async fn test_run_and_stop() {
        let mock = MockModel::new("mock").with_fallback("pong");
        let (bus, agent) = agent(&mock);
        let agent = Arc::new(agent);
        let mut rx = bus.subscribe_channel("cli").await;

        let runner = Arc::clone(&agent);
        let handle = tokio::spawn(async move { runner.run().await });

        bus.publish_inbound(InboundMessage::cli("ping")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "pong");
        assert!(agent.is_running().await);

        agent.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
