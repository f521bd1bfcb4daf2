//! Channel implementations.
//!
//! - [`cli::CliChannel`] - console session (always available)
//! - [`telegram::TelegramChannel`] - Telegram bot (requires `telegram` feature)

pub mod cli;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use cli::CliChannel;

#[cfg(feature = "telegram")]
pub use telegram::TelegramChannel;
