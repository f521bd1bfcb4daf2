//! Gateway service for running the complete bot.
//!
//! The gateway is the unified entry point that orchestrates:
//! - Message bus
//! - Channel manager (Telegram, CLI)
//! - Agent loop
//! - Session store

use crate::agent::{AgentLoop, TurnProcessor};
use crate::bus::MessageBus;
use crate::channel::{Channel, ChannelManager};
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::providers::Model;
use crate::session::{ContextBuilder, SessionStore};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[cfg(feature = "telegram")]
use crate::channels::{TelegramChannel, telegram::TelegramChannelConfig};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bot configuration.
    pub bot_config: BotConfig,
    /// Whether to register the Telegram channel.
    pub enable_telegram: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bot_config: BotConfig::default(),
            enable_telegram: true,
        }
    }
}

/// Gateway service that runs the complete bot.
pub struct Gateway {
    config: GatewayConfig,
    bus: MessageBus,
    channel_manager: ChannelManager,
    extra_channels: Vec<Arc<dyn Channel>>,
    agent: AgentLoop,
    running: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Get a reference to the message bus.
    #[must_use]
    pub const fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Get the session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.agent.processor().sessions()
    }

    /// Register channels based on configuration.
    async fn setup_channels(&self) -> Result<()> {
        #[cfg(feature = "telegram")]
        if self.config.enable_telegram {
            let tg_config = TelegramChannelConfig::from_config(&self.config.bot_config.telegram)?;
            self.channel_manager
                .register(Arc::new(TelegramChannel::new(tg_config)))
                .await;
        }

        #[cfg(not(feature = "telegram"))]
        if self.config.enable_telegram {
            return Err(BotError::config(
                "telegram support is not compiled in (enable the `telegram` feature)",
            ));
        }

        for channel in &self.extra_channels {
            self.channel_manager.register(Arc::clone(channel)).await;
        }
        Ok(())
    }

    /// Run until [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel fails to start.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes or [`stop`](Self::stop) is called.
    ///
    /// Channels are stopped before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel fails to start.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("gateway starting");
        self.setup_channels().await?;

        if let Err(e) = self.channel_manager.start_all().await {
            self.channel_manager.stop_all().await;
            return Err(e.into());
        }
        *self.running.write().await = true;
        let channels = self.channel_manager.channel_count().await;
        info!(channels, "gateway started");

        let result = tokio::select! {
            result = self.agent.run() => result,
            () = shutdown => {
                info!("shutdown requested");
                self.agent.stop().await;
                Ok(())
            }
        };

        info!("gateway stopping");
        self.channel_manager.stop_all().await;
        *self.running.write().await = false;
        info!("gateway stopped");
        result
    }

    /// Ask the agent loop to stop.
    pub async fn stop(&self) {
        self.agent.stop().await;
    }

    /// Check if the gateway is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Snapshot of channel, bus and session counters.
    pub async fn status(&self) -> GatewayStatus {
        let channel_statuses = self.channel_manager.status_all().await;
        let bus_stats = self.bus.stats().await;

        GatewayStatus {
            running: *self.running.read().await,
            channels: channel_statuses
                .into_iter()
                .map(|s| ChannelStatusInfo {
                    healthy: s.is_healthy(),
                    name: s.name,
                    state: s.state.to_string(),
                    messages_received: s.messages_received,
                    messages_sent: s.messages_sent,
                })
                .collect(),
            total_inbound: bus_stats.inbound_count,
            total_outbound: bus_stats.outbound_count,
            dropped_outbound: bus_stats.dropped_count,
            sessions: self.sessions().len().await,
        }
    }
}

/// Gateway status information.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    /// Whether the gateway is running.
    pub running: bool,
    /// Channel statuses.
    pub channels: Vec<ChannelStatusInfo>,
    /// Total inbound messages processed.
    pub total_inbound: u64,
    /// Total outbound messages delivered.
    pub total_outbound: u64,
    /// Outbound messages without a subscriber.
    pub dropped_outbound: u64,
    /// Live user sessions.
    pub sessions: usize,
}

/// Channel status info for gateway status.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatusInfo {
    /// Channel name.
    pub name: String,
    /// Channel state.
    pub state: String,
    /// Messages received.
    pub messages_received: u64,
    /// Messages sent.
    pub messages_sent: u64,
    /// Whether the channel is healthy.
    pub healthy: bool,
}

/// Builder for creating a Gateway.
#[derive(Default)]
pub struct GatewayBuilder {
    model: Option<Arc<dyn Model>>,
    config: GatewayConfig,
    channels: Vec<Arc<dyn Channel>>,
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model.
    #[must_use]
    pub fn model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the bot configuration.
    #[must_use]
    pub fn bot_config(mut self, config: BotConfig) -> Self {
        self.config.bot_config = config;
        self
    }

    /// Enable or disable the Telegram channel.
    #[must_use]
    pub const fn enable_telegram(mut self, enable: bool) -> Self {
        self.config.enable_telegram = enable;
        self
    }

    /// Register an additional channel.
    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if no model is set or the configuration is invalid.
    pub fn build(self) -> Result<Gateway> {
        let model = self
            .model
            .ok_or_else(|| BotError::config("model is required"))?;
        self.config.bot_config.validate()?;

        let bot_config = &self.config.bot_config;
        let sessions = Arc::new(SessionStore::new(bot_config.memory, ContextBuilder::default()));
        let processor = Arc::new(TurnProcessor::new(sessions, model, &bot_config.generation));

        let bus = MessageBus::new();
        Ok(Gateway {
            agent: AgentLoop::new(bus.clone(), processor),
            channel_manager: ChannelManager::new(bus.clone()),
            bus,
            extra_channels: self.channels,
            config: self.config,
            running: Arc::new(RwLock::new(false)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::CliChannel;
    use crate::providers::MockModel;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[test]
    fn test_build_requires_model() {
        assert!(matches!(
            GatewayBuilder::new().build(),
            Err(BotError::Config(_))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = BotConfig::default();
        config.memory.max_turns = 0;
        let result = Gateway::builder()
            .model(Arc::new(MockModel::new("mock")))
            .bot_config(config)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_telegram_without_token_fails_fast() {
        let gateway = Gateway::builder()
            .model(Arc::new(MockModel::new("mock")))
            .build()
            .unwrap();
        assert!(gateway.run_until(async {}).await.is_err());
        assert!(!gateway.is_running().await);
    }

    #[tokio::test]
    async fn test_cli_round_trip_until_shutdown() {
        let mock = MockModel::new("mock").with_fallback("mirrored");
        let cli = Arc::new(CliChannel::new().with_input(b"hello\n".as_slice()));
        let gateway = Arc::new(
            Gateway::builder()
                .model(Arc::new(mock.clone()))
                .enable_telegram(false)
                .channel(cli)
                .build()
                .unwrap(),
        );

        let shutdown = Arc::new(Notify::new());
        let runner = Arc::clone(&gateway);
        let signal = Arc::clone(&shutdown);
        let handle =
            tokio::spawn(async move { runner.run_until(async move { signal.notified().await }).await });

        let sessions = Arc::clone(gateway.sessions());
        tokio::time::timeout(Duration::from_secs(2), async {
            while sessions.turns("cli:user").await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let status = gateway.status().await;
        assert!(status.running);
        assert_eq!(status.sessions, 1);
        assert_eq!(status.channels[0].name, "cli");

        shutdown.notify_one();
        handle.await.unwrap().unwrap();
        assert!(!gateway.is_running().await);
        assert_eq!(mock.request_count(), 1);
    }
}
