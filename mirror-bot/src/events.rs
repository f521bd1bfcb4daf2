//! Message events for channel communication.
//!
//! This module defines the message types that flow through the message bus,
//! decoupling chat channels from the agent loop.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// An inbound message from a channel to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Unique message ID.
    pub id: String,
    /// Channel identifier (e.g., "telegram", "cli").
    pub channel: String,
    /// Sender's identifier within the channel.
    pub sender_id: String,
    /// Chat/conversation identifier.
    pub chat_id: String,
    /// Message text content.
    pub content: String,
    /// Whether the transport flagged the text as a command.
    #[serde(default)]
    pub is_command: bool,
    /// Timestamp when the message was received.
    pub timestamp: SystemTime,
}

impl InboundMessage {
    /// Create a new inbound message.
    ///
    /// The command flag is derived from a leading `/`.
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: generate_message_id(),
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            is_command: content.trim_start().starts_with('/'),
            content,
            timestamp: SystemTime::now(),
        }
    }

    /// Create a CLI message.
    pub fn cli(content: impl Into<String>) -> Self {
        Self::new("cli", "user", "direct", content)
    }

    /// Override the command flag set by the transport.
    #[must_use]
    pub const fn with_command_flag(mut self, is_command: bool) -> Self {
        self.is_command = is_command;
        self
    }

    /// Session key of the sender. Memory is per user, not per chat.
    #[must_use]
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.sender_id)
    }
}

/// An outbound message from the agent to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Unique message ID.
    pub id: String,
    /// Target channel identifier.
    pub channel: String,
    /// Target chat/conversation identifier.
    pub chat_id: String,
    /// Message text content, sent as plain text.
    pub content: String,
    /// Optional message ID to reply to.
    pub reply_to: Option<String>,
    /// Quick-reply button rows. Empty means no keyboard.
    #[serde(default)]
    pub quick_replies: Vec<Vec<String>>,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_message_id(),
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
            quick_replies: Vec::new(),
        }
    }

    /// Create a response to an inbound message.
    pub fn reply_to(msg: &InboundMessage, content: impl Into<String>) -> Self {
        Self {
            reply_to: Some(msg.id.clone()),
            ..Self::new(msg.channel.clone(), msg.chat_id.clone(), content)
        }
    }

    /// Attach quick-reply button rows.
    #[must_use]
    pub fn with_quick_replies(mut self, rows: Vec<Vec<String>>) -> Self {
        self.quick_replies = rows;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello!");
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.sender_id, "user123");
        assert_eq!(msg.chat_id, "chat456");
        assert!(!msg.is_command);
        assert_eq!(msg.session_key(), "telegram:user123");
    }

    #[test]
    fn test_command_flag() {
        assert!(InboundMessage::cli("/reset").is_command);
        assert!(!InboundMessage::cli("/reset").with_command_flag(false).is_command);
    }

    #[test]
    fn test_outbound_reply() {
        let inbound = InboundMessage::new("telegram", "user123", "chat456", "Hi");
        let outbound = OutboundMessage::reply_to(&inbound, "Hello back!")
            .with_quick_replies(vec![vec!["/reset".to_string()]]);

        assert_eq!(outbound.channel, "telegram");
        assert_eq!(outbound.chat_id, "chat456");
        assert_eq!(outbound.reply_to, Some(inbound.id));
        assert_eq!(outbound.quick_replies.len(), 1);
    }

    #[test]
    fn test_message_id_uniqueness() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("msg_"));
    }
}
