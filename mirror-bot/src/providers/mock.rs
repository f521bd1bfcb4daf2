//! Scripted model for tests and offline runs.
//!
//! [`MockModel`] answers from a queue of scripted replies and records every
//! request it receives, so callers can assert on the exact context that was
//! sent to the engine.

use crate::error::{CompletionError, CompletionResult};
use crate::providers::{ChatMessage, GenerateOptions, Model, ModelResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A request captured by [`MockModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Messages passed to `generate`.
    pub messages: Vec<ChatMessage>,
    /// Options passed to `generate`.
    pub options: GenerateOptions,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<Result<String, String>>,
    fallback: Option<String>,
    requests: Vec<RecordedRequest>,
}

/// A model that replays scripted responses.
///
/// Clones share the same script and request log.
#[derive(Debug, Clone)]
pub struct MockModel {
    model_id: String,
    state: Arc<Mutex<MockState>>,
}

impl MockModel {
    /// Create a mock model with an empty script.
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Answer with `text` whenever the script is exhausted.
    #[must_use]
    pub fn with_fallback(self, text: impl Into<String>) -> Self {
        self.lock().fallback = Some(text.into());
        self
    }

    /// Queue a successful reply.
    pub fn push_response(&self, text: impl Into<String>) {
        self.lock().script.push_back(Ok(text.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock().script.push_back(Err(message.into()));
    }

    /// All requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Model for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> CompletionResult<ModelResponse> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest { messages, options });

        match state.script.pop_front() {
            Some(Ok(text)) => Ok(ModelResponse::new(text)),
            Some(Err(message)) => Err(CompletionError::model(message)),
            None => state
                .fallback
                .clone()
                .map(ModelResponse::new)
                .ok_or_else(|| CompletionError::model("mock script exhausted")),
        }
    }
}
