//! Channel trait and shared lifecycle bookkeeping.
//!
//! A channel connects one chat transport to the [`MessageBus`]: it publishes
//! what users type as [`InboundMessage`](crate::events::InboundMessage)s and
//! delivers the replies routed to its name.

use crate::bus::MessageBus;
use crate::error::ChannelResult;
use crate::events::OutboundMessage;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Channel is not started.
    #[default]
    Stopped,
    /// Channel is starting up.
    Starting,
    /// Channel is running and connected.
    Running,
    /// Channel is stopping.
    Stopping,
    /// Channel encountered an error.
    Error,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Channel status information.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    /// Channel name.
    pub name: String,
    /// Current state.
    pub state: ChannelState,
    /// Number of messages received.
    pub messages_received: u64,
    /// Number of messages sent.
    pub messages_sent: u64,
    /// Last error message, if any.
    pub last_error: Option<String>,
}

impl ChannelStatus {
    /// Running and without a recorded error.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == ChannelState::Running && self.last_error.is_none()
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique name, used as the outbound routing key.
    fn name(&self) -> &str;

    /// Connect and begin relaying.
    ///
    /// Implementations subscribe to `bus.subscribe_channel(self.name())` for
    /// replies and spawn their own background tasks.
    async fn start(&self, bus: &MessageBus) -> ChannelResult<()>;

    /// Stop background tasks.
    async fn stop(&self) -> ChannelResult<()>;

    /// Deliver one outbound message.
    async fn send(&self, msg: &OutboundMessage) -> ChannelResult<()>;

    /// Current status.
    async fn status(&self) -> ChannelStatus;

    /// Check if the channel is currently running.
    async fn is_running(&self) -> bool {
        self.status().await.state == ChannelState::Running
    }
}

/// Starts, stops and reports a set of channels.
pub struct ChannelManager {
    channels: RwLock<Vec<Arc<dyn Channel>>>,
    bus: MessageBus,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Create a new channel manager with the given message bus.
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Register a channel.
    pub async fn register(&self, channel: Arc<dyn Channel>) {
        info!(channel = %channel.name(), "channel registered");
        self.channels.write().await.push(channel);
    }

    /// Start every channel in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first start failure. Channels started before it keep
    /// running; call [`stop_all`](Self::stop_all) to tear them down.
    pub async fn start_all(&self) -> ChannelResult<()> {
        for channel in self.channels.read().await.iter() {
            info!(channel = %channel.name(), "starting channel");
            if let Err(e) = channel.start(&self.bus).await {
                error!(channel = %channel.name(), error = %e, "failed to start channel");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop every channel, logging failures.
    pub async fn stop_all(&self) {
        for channel in self.channels.read().await.iter() {
            info!(channel = %channel.name(), "stopping channel");
            if let Err(e) = channel.stop().await {
                error!(channel = %channel.name(), error = %e, "failed to stop channel");
            }
        }
    }

    /// Status of every channel.
    pub async fn status_all(&self) -> Vec<ChannelStatus> {
        let channels = self.channels.read().await;
        let mut statuses = Vec::with_capacity(channels.len());
        for channel in channels.iter() {
            statuses.push(channel.status().await);
        }
        statuses
    }

    /// Get the number of registered channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

/// State and counters shared by channel implementations.
pub struct ChannelBase {
    name: String,
    state: RwLock<ChannelState>,
    stats: RwLock<ChannelStats>,
}

impl fmt::Debug for ChannelBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ChannelStats {
    messages_received: u64,
    messages_sent: u64,
    last_error: Option<String>,
}

impl ChannelBase {
    /// Create a new channel base.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ChannelState::default()),
            stats: RwLock::new(ChannelStats::default()),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    /// Set the channel state.
    pub async fn set_state(&self, state: ChannelState) {
        *self.state.write().await = state;
        debug!(channel = %self.name, %state, "channel state changed");
    }

    /// Record a received message.
    pub async fn record_received(&self) {
        self.stats.write().await.messages_received += 1;
    }

    /// Record a sent message.
    pub async fn record_sent(&self) {
        self.stats.write().await.messages_sent += 1;
    }

    /// Record an error.
    pub async fn record_error(&self, error: impl Into<String>) {
        let error = error.into();
        error!(channel = %self.name, %error, "channel error");
        self.stats.write().await.last_error = Some(error);
    }

    /// Build status from current state and stats.
    pub async fn build_status(&self) -> ChannelStatus {
        let state = *self.state.read().await;
        let stats = self.stats.read().await;

        ChannelStatus {
            name: self.name.clone(),
            state,
            messages_received: stats.messages_received,
            messages_sent: stats.messages_sent,
            last_error: stats.last_error.clone(),
        }
    }
}
