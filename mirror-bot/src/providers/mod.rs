//! Completion engine providers.
//!
//! The bot talks to its language model exclusively through the [`Model`]
//! trait: an ordered list of role-tagged messages goes in, one generated text
//! comes out. Each provider implements the trait over its own HTTP API.
//!
//! # Supported Providers
//!
//! - **`OpenAI`**: Chat Completions API and compatible endpoints
//! - **Mock**: scripted responses for tests and offline runs
//!
//! # Example
//!
//! ```rust,ignore
//! use mirror_bot::providers::{ChatMessage, GenerateOptions, Model, OpenAIClient};
//!
//! let client = OpenAIClient::new("sk-...")?;
//! let model = client.completion_model("gpt-4o-mini");
//! let response = model
//!     .generate(vec![ChatMessage::user("Hello!")], GenerateOptions::new())
//!     .await?;
//! println!("{}", response.text);
//! ```

mod types;

pub mod mock;
pub mod openai;

pub use types::{ChatMessage, GenerateOptions, ModelResponse, Role, TokenUsage};

pub use mock::MockModel;
pub use openai::OpenAIClient;

use crate::error::CompletionResult;
use async_trait::async_trait;
use std::sync::Arc;

/// The core trait for language model implementations.
///
/// Implementations must be cheap to share: the bot holds them behind an
/// [`Arc`] and calls them from concurrent tasks.
#[async_trait]
pub trait Model: Send + Sync {
    /// Get the model identifier (e.g., "gpt-4o-mini").
    fn model_id(&self) -> &str;

    /// Generate a response for the given messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails or the response cannot be parsed.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> CompletionResult<ModelResponse>;

    /// Get the provider name (e.g., "openai").
    fn provider(&self) -> &'static str {
        "unknown"
    }
}

#[async_trait]
impl<M: Model + ?Sized> Model for Arc<M> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> CompletionResult<ModelResponse> {
        (**self).generate(messages, options).await
    }

    fn provider(&self) -> &'static str {
        (**self).provider()
    }
}

/// Safely convert u64 to u32, saturating at `u32::MAX` if overflow.
#[inline]
#[must_use]
pub(crate) fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_u32() {
        assert_eq!(saturating_u32(42), 42);
        assert_eq!(saturating_u32(u64::MAX), u32::MAX);
    }

    #[tokio::test]
    async fn test_arc_model_delegates() {
        let mock = MockModel::new("mock-1");
        mock.push_response("pong");
        let shared: Arc<dyn Model> = Arc::new(mock.clone());

        assert_eq!(shared.model_id(), "mock-1");
        assert_eq!(shared.provider(), "mock");
        let response = shared
            .generate(vec![ChatMessage::user("ping")], GenerateOptions::new())
            .await
            .unwrap();
        assert_eq!(response.text, "pong");
        assert_eq!(mock.request_count(), 1);
    }
}
