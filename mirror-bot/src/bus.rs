//! Async message bus between channels and the agent loop.
//!
//! Inbound messages from every channel share one queue consumed by the agent
//! loop. Outbound replies are routed to the subscribers of the channel named
//! in the message.

use crate::error::{BusError, BusResult};
use crate::events::{InboundMessage, OutboundMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, trace, warn};

/// Default capacity for message queues.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Async message bus that decouples chat channels from the agent loop.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<MessageBusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus").finish_non_exhaustive()
    }
}

struct MessageBusInner {
    /// Inbound message queue (channels → agent).
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,

    /// Per-channel subscribers (agent → channels).
    channel_subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<OutboundMessage>>>>,

    capacity: usize,
    stats: RwLock<BusStats>,
}

/// Message bus statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Total inbound messages published.
    pub inbound_count: u64,
    /// Total outbound messages delivered to at least one subscriber.
    pub outbound_count: u64,
    /// Outbound messages nobody was subscribed to receive.
    pub dropped_count: u64,
}

impl MessageBus {
    /// Create a new message bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a new message bus with specified queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

        Self {
            inner: Arc::new(MessageBusInner {
                inbound_tx,
                inbound_rx: Mutex::new(inbound_rx),
                channel_subscribers: RwLock::new(HashMap::new()),
                capacity,
                stats: RwLock::new(BusStats::default()),
            }),
        }
    }

    /// Publish an inbound message from a channel to the agent.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InboundClosed`] if the queue is gone.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> BusResult<()> {
        trace!(
            channel = %msg.channel,
            sender = %msg.sender_id,
            "publishing inbound message"
        );

        self.inner
            .inbound_tx
            .send(msg)
            .await
            .map_err(|_| BusError::InboundClosed)?;

        self.inner.stats.write().await.inbound_count += 1;
        Ok(())
    }

    /// Consume the next inbound message.
    ///
    /// This should only be called by the agent loop.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inner.inbound_rx.lock().await.recv().await
    }

    /// Consume the next inbound message, giving up after `timeout`.
    pub async fn consume_inbound_timeout(&self, timeout: Duration) -> Option<InboundMessage> {
        let mut rx = self.inner.inbound_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Deliver an outbound message to the subscribers of its channel.
    ///
    /// A message with no live subscriber is counted as dropped and logged.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> BusResult<()> {
        trace!(
            channel = %msg.channel,
            chat_id = %msg.chat_id,
            "publishing outbound message"
        );

        let senders = self
            .inner
            .channel_subscribers
            .read()
            .await
            .get(&msg.channel)
            .cloned()
            .unwrap_or_default();

        let mut delivered = false;
        for sender in &senders {
            if sender.send(msg.clone()).await.is_ok() {
                delivered = true;
            } else {
                debug!(channel = %msg.channel, "channel subscriber disconnected");
            }
        }

        let mut stats = self.inner.stats.write().await;
        if delivered {
            stats.outbound_count += 1;
        } else {
            stats.dropped_count += 1;
            warn!(channel = %msg.channel, "no subscriber for outbound message");
        }
        Ok(())
    }

    /// Subscribe to outbound messages for a specific channel.
    pub async fn subscribe_channel(&self, channel: &str) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        let mut subscribers = self.inner.channel_subscribers.write().await;
        let list = subscribers.entry(channel.to_string()).or_default();
        list.retain(|s| !s.is_closed());
        list.push(tx);

        debug!(channel = %channel, "new channel subscriber registered");
        rx
    }

    /// Get current bus statistics.
    pub async fn stats(&self) -> BusStats {
        *self.inner.stats.read().await
    }

    /// Create a handle for publishing inbound messages.
    #[must_use]
    pub fn inbound_handle(&self) -> InboundHandle {
        InboundHandle {
            tx: self.inner.inbound_tx.clone(),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight handle for publishing inbound messages.
///
/// Moved into transport callbacks that must not hold the whole bus.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    tx: mpsc::Sender<InboundMessage>,
}

impl InboundHandle {
    /// Publish an inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InboundClosed`] if the queue is gone.
    pub async fn publish(&self, msg: InboundMessage) -> BusResult<()> {
        self.tx.send(msg).await.map_err(|_| BusError::InboundClosed)
    }
}
