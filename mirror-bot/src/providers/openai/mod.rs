//! `OpenAI` provider.

mod client;
mod completion;

pub use client::{DEFAULT_TIMEOUT_SECS, OPENAI_API_BASE_URL, OpenAIClient, OpenAIClientBuilder};
pub use completion::CompletionModel;
