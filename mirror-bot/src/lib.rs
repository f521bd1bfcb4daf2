//! Mirror Bot - a Telegram relay to a chat-completion model with per-user memory.
//!
//! Every user gets a small memory: the last few turns of the conversation and
//! a rolling summary of what came before. Each message is answered by the
//! model with that memory as context; afterwards older turns are folded into
//! the summary once enough have piled up.
//!
//! # Architecture
//!
//! - **Message Bus** ([`bus`]) - Async queues between channels and the agent
//! - **Channels** ([`channels`]) - Telegram and console transports
//! - **Agent** ([`agent`]) - Message loop, turn processing, summary compaction
//! - **Commands** ([`commands`]) - `/start`, `/reset`, `/summary`, `/mirror`
//! - **Session** ([`session`]) - In-memory per-user turns and summary
//! - **Providers** ([`providers`]) - Completion engine clients
//! - **Gateway** ([`gateway`]) - Wires everything together
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mirror_bot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BotConfig::resolve(None, None).await?;
//!     let model = OpenAIClient::new(config.require_api_key()?)?
//!         .completion_model(&config.provider.model);
//!
//!     let gateway = Gateway::builder()
//!         .model(Arc::new(model))
//!         .bot_config(config)
//!         .build()?;
//!     gateway.run().await
//! }
//! ```
//!
//! # Features
//!
//! - `telegram` (default) - Enable Telegram bot support via teloxide

pub mod agent;
pub mod bus;
pub mod channel;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod prompts;
pub mod providers;
pub mod session;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error types (centralized)
    pub use crate::error::{
        BotError, BusError, BusResult, ChannelError, ChannelResult, CompletionError,
        CompletionResult, ConfigError, ConfigResult, DisplayError, Result,
    };

    // Agent
    pub use crate::agent::{AgentLoop, CompactionOutcome, Compactor, TurnProcessor};

    // Bus
    pub use crate::bus::{BusStats, InboundHandle, MessageBus};

    // Channel
    pub use crate::channel::{Channel, ChannelBase, ChannelManager, ChannelState, ChannelStatus};
    pub use crate::channels::CliChannel;
    pub use crate::channels::cli::CliChannelConfig;
    #[cfg(feature = "telegram")]
    pub use crate::channels::{TelegramChannel, telegram::TelegramChannelConfig};

    // Commands
    pub use crate::commands::{BotCommand, CommandRouter, Input, quick_replies};

    // Config
    pub use crate::config::{
        BotConfig, DEFAULT_MODEL, ENV_API_KEY, ENV_BASE_URL, ENV_BOT_TOKEN, ENV_CONFIG_PATH,
        ENV_MODEL, ENV_TELEGRAM_TOKEN, GenerationConfig, ProviderConfig, TelegramConfig,
    };

    // Events
    pub use crate::events::{InboundMessage, OutboundMessage};

    // Gateway
    pub use crate::gateway::{Gateway, GatewayBuilder, GatewayConfig, GatewayStatus};

    // Providers
    pub use crate::providers::{
        ChatMessage, GenerateOptions, MockModel, Model, ModelResponse, OpenAIClient, Role,
    };

    // Session
    pub use crate::session::{
        ContextBuilder, MemoryConfig, Session, SessionStore, Turn, TurnRole,
    };
}
