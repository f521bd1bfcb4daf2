//! `OpenAI` Chat Completions API implementation.
//!
//! Implements the [`Model`] trait for the `/chat/completions` endpoint.

use super::client::OpenAIClient;
use crate::error::{CompletionError, CompletionResult};
use crate::providers::{
    ChatMessage, GenerateOptions, Model, ModelResponse, TokenUsage, saturating_u32,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

/// `OpenAI` Chat Completion model.
#[derive(Clone)]
pub struct CompletionModel {
    client: OpenAIClient,
    model_id: String,
}

impl std::fmt::Debug for CompletionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionModel")
            .field("model_id", &self.model_id)
            .field("base_url", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

impl CompletionModel {
    /// Create a new completion model.
    pub(crate) fn new(client: OpenAIClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    /// Build the request body for the API.
    fn build_request_body(&self, messages: &[ChatMessage], options: &GenerateOptions) -> Value {
        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
        });

        if let Some(temp) = options.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        body
    }

    /// Parse the API response into a `ModelResponse`.
    fn parse_response(json: &Value) -> CompletionResult<ModelResponse> {
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CompletionError::malformed("missing choices[0].message.content"))?;

        let mut response = ModelResponse::new(content.trim());

        if let Some(usage) = json.get("usage") {
            response = response.with_token_usage(TokenUsage::new(
                saturating_u32(usage["prompt_tokens"].as_u64().unwrap_or(0)),
                saturating_u32(usage["completion_tokens"].as_u64().unwrap_or(0)),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl Model for CompletionModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip(self, messages, options), fields(model = %self.model_id, messages = messages.len()))]
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerateOptions,
    ) -> CompletionResult<ModelResponse> {
        let body = self.build_request_body(&messages, &options);
        let url = format!("{}/chat/completions", self.client.base_url());

        debug!("Sending request to OpenAI API");

        let response = self
            .client
            .http_client()
            .post(&url)
            .headers(self.client.auth_headers())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let json: Value = response.json().await?;
        let parsed = Self::parse_response(&json)?;

        if let Some(usage) = parsed.token_usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "OpenAI API response"
            );
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model_for(server: &MockServer) -> CompletionModel {
        OpenAIClient::builder("test-key")
            .base_url(format!("{}/v1", server.uri()))
            .build()
            .unwrap()
            .completion_model("gpt-4o-mini")
    }

    #[test]
    fn test_request_body_shape() {
        let model = OpenAIClient::new("k").unwrap().completion_model("gpt-4o-mini");
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body =
            model.build_request_body(&messages, &GenerateOptions::new().with_temperature(0.25));

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["temperature"], 0.25);
    }

    #[test]
    fn test_parse_response_trims_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  hello \n"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let response = CompletionModel::parse_response(&json).unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.token_usage, Some(TokenUsage::new(12, 3)));
    }

    #[test]
    fn test_parse_response_missing_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        });
        let err = CompletionModel::parse_response(&json).unwrap_err();
        assert!(matches!(err, CompletionError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_generate_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.5,
                "messages": [{"role": "user", "content": "ping"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "pong"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = model_for(&server)
            .generate(
                vec![ChatMessage::user("ping")],
                GenerateOptions::new().with_temperature(0.5),
            )
            .await
            .unwrap();

        assert_eq!(response.text, "pong");
        assert_eq!(response.token_usage, None);
    }

    #[tokio::test]
    async fn test_generate_maps_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = model_for(&server)
            .generate(vec![ChatMessage::user("ping")], GenerateOptions::new())
            .await
            .unwrap_err();

        match err {
            CompletionError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
