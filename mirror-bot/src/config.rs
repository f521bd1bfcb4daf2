//! Bot configuration.
//!
//! Secrets come only from the environment. Everything else has a default and
//! can be tuned through an optional JSON settings file:
//!
//! ```json
//! {
//!   "provider": { "model": "gpt-4o-mini", "timeout_secs": 60 },
//!   "memory": { "max_turns": 8, "summary_max_chars": 4000 },
//!   "generation": { "reply_temperature": 0.3 }
//! }
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::providers::openai::{DEFAULT_TIMEOUT_SECS, OPENAI_API_BASE_URL};
use crate::session::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Primary environment variable holding the Telegram bot token.
pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
/// Fallback environment variable holding the Telegram bot token.
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
/// Environment variable holding the completion API key.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the model name.
pub const ENV_MODEL: &str = "OPENAI_MODEL";
/// Environment variable overriding the API base URL.
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
/// Environment variable pointing at the settings file.
pub const ENV_CONFIG_PATH: &str = "MIRROR_BOT_CONFIG";

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Telegram's hard limit on message length.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Telegram transport settings.
    pub telegram: TelegramConfig,
    /// Completion engine settings.
    pub provider: ProviderConfig,
    /// Per-user memory limits.
    pub memory: MemoryConfig,
    /// Sampling parameters.
    pub generation: GenerationConfig,
}

/// Telegram transport settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. Read from the environment only.
    #[serde(skip)]
    pub token: Option<String>,
    /// Maximum length of a single outgoing message.
    pub max_message_length: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            max_message_length: TELEGRAM_MAX_MESSAGE_LENGTH,
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &redact(self.token.as_deref()))
            .field("max_message_length", &self.max_message_length)
            .finish()
    }
}

/// Completion engine settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key. Read from the environment only.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// Request timeout in seconds. `None` disables the timeout.
    pub timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_BASE_URL.to_string(),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(self.api_key.as_deref()))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Sampling parameters for the two kinds of engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Temperature of conversational replies.
    pub reply_temperature: f32,
    /// Temperature of summary compression.
    pub summary_temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            reply_temperature: 0.3,
            summary_temperature: 0.2,
        }
    }
}

impl BotConfig {
    /// Load settings from a JSON file. Secrets are never read from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the settings file if given, then apply the process environment
    /// and an optional model override.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub async fn resolve(path: Option<&Path>, model: Option<&str>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => Self::load(path).await?,
            None => Self::default(),
        };
        config.layered(|key| std::env::var(key).ok(), model)
    }

    /// Apply the environment, then `model` over it, and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the layered settings are invalid.
    pub fn layered(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
        model: Option<&str>,
    ) -> ConfigResult<Self> {
        self.apply_env(lookup);
        if let Some(model) = model {
            self.provider.model = model.to_string();
        }
        self.validate()?;
        Ok(self)
    }

    /// Overlay values from the environment.
    ///
    /// `lookup` maps a variable name to its value. Blank values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = get(ENV_BOT_TOKEN).or_else(|| get(ENV_TELEGRAM_TOKEN)) {
            self.telegram.token = Some(token);
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = get(ENV_MODEL) {
            self.provider.model = model;
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.provider.base_url = url;
        }
    }

    /// Get the bot token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when neither token variable is set.
    pub fn require_bot_token(&self) -> ConfigResult<&str> {
        self.telegram
            .token
            .as_deref()
            .ok_or_else(|| ConfigError::missing(format!("{ENV_BOT_TOKEN} (or {ENV_TELEGRAM_TOKEN})")))
    }

    /// Get the completion API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when the variable is not set.
    pub fn require_api_key(&self) -> ConfigResult<&str> {
        self.provider
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::missing(ENV_API_KEY))
    }

    /// Check that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        self.memory.validate()?;

        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::invalid("provider.model must not be empty"));
        }
        if !(self.provider.base_url.starts_with("http://")
            || self.provider.base_url.starts_with("https://"))
        {
            return Err(ConfigError::invalid(format!(
                "provider.base_url must be an http(s) URL, got '{}'",
                self.provider.base_url
            )));
        }
        if self.telegram.max_message_length == 0
            || self.telegram.max_message_length > TELEGRAM_MAX_MESSAGE_LENGTH
        {
            return Err(ConfigError::invalid(format!(
                "telegram.max_message_length must be within 1..={TELEGRAM_MAX_MESSAGE_LENGTH}"
            )));
        }
        for (name, value) in [
            ("generation.reply_temperature", self.generation.reply_temperature),
            ("generation.summary_temperature", self.generation.summary_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::invalid(format!(
                    "{name} must be within 0.0..=2.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
        assert_eq!(config.memory.max_turns, 8);
        assert!((config.generation.reply_temperature - 0.3).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_override_wins_and_is_validated() {
        let config = BotConfig::default()
            .layered(env(&[(ENV_MODEL, "gpt-4o")]), Some("local"))
            .unwrap();
        assert_eq!(config.provider.model, "local");

        let blank = BotConfig::default().layered(env(&[(ENV_MODEL, "gpt-4o")]), Some("  "));
        assert!(matches!(blank, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_credentials_fail() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[]));

        assert!(matches!(
            config.require_bot_token(),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_bot_token_fallback() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[(ENV_TELEGRAM_TOKEN, "fallback")]));
        assert_eq!(config.require_bot_token().unwrap(), "fallback");

        let mut config = BotConfig::default();
        config.apply_env(env(&[
            (ENV_BOT_TOKEN, "primary"),
            (ENV_TELEGRAM_TOKEN, "fallback"),
        ]));
        assert_eq!(config.require_bot_token().unwrap(), "primary");
    }

    #[test]
    fn test_env_overrides_model_and_ignores_blank() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[
            (ENV_API_KEY, "sk-test"),
            (ENV_MODEL, "gpt-4o"),
            (ENV_BASE_URL, "  "),
        ]));

        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.provider.base_url, OPENAI_API_BASE_URL);
    }

    #[test]
    fn test_parse_partial_file_and_skip_secrets() {
        let json = r#"{
            "provider": { "model": "local", "api_key": "ignored" },
            "memory": { "summary_max_chars": 500 }
        }"#;
        let config: BotConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.provider.model, "local");
        assert!(config.provider.api_key.is_none());
        assert_eq!(config.memory.summary_max_chars, Some(500));
        assert_eq!(config.memory.retain_after_compaction, 6);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[(ENV_API_KEY, "sk-secret"), (ENV_BOT_TOKEN, "123:abc")]));

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("123:abc"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BotConfig::default();
        config.provider.base_url = "ftp://example".to_string();
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.generation.reply_temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.memory.retain_after_compaction = 20;
        assert!(config.validate().is_err());
    }
}
