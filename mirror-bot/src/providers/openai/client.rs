//! `OpenAI` API client implementation.
//!
//! Provides a client for OpenAI's Chat Completions API and any endpoint that
//! speaks the same protocol (Azure `OpenAI`, local proxies, gateways).

use super::completion::CompletionModel;
use crate::error::CompletionResult;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// Default `OpenAI` API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// `OpenAI` API client for creating completion models.
///
/// # Example
///
/// ```rust,ignore
/// use mirror_bot::providers::openai::OpenAIClient;
///
/// let client = OpenAIClient::builder("sk-...")
///     .base_url("https://my-openai-proxy.com/v1")
///     .build()?;
/// let model = client.completion_model("gpt-4o-mini");
/// ```
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: reqwest::Client,
    api_key: Arc<str>,
    base_url: Arc<str>,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    /// Create a new `OpenAI` client with the given API key and default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api_key: impl Into<String>) -> CompletionResult<Self> {
        Self::builder(api_key).build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> OpenAIClientBuilder {
        OpenAIClientBuilder::new(api_key)
    }

    /// Create a completion model with the specified model ID.
    #[must_use]
    pub fn completion_model(&self, model_id: impl Into<String>) -> CompletionModel {
        CompletionModel::new(self.clone(), model_id)
    }

    /// Get the base URL for API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the HTTP client instance.
    #[must_use]
    pub const fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Build authentication headers for API requests.
    #[must_use]
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// Builder for [`OpenAIClient`].
#[derive(Debug)]
pub struct OpenAIClientBuilder {
    api_key: String,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl OpenAIClientBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set a custom base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds. `None` disables the timeout.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: Option<u64>) -> Self {
        self.timeout_secs = timeout;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build.
    pub fn build(self) -> CompletionResult<OpenAIClient> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| OPENAI_API_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(OpenAIClient {
            http_client: builder.build()?,
            api_key: self.api_key.into(),
            base_url: base_url.into(),
        })
    }
}
