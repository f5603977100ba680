//! OpenAI-compatible chat completions backend
//!
//! Serves both the DeepSeek (SiliconFlow-hosted) and OpenAI endpoints; they
//! share a wire format and differ only in URL, default model and sampling
//! parameters.

use crate::error::RecommendationError;
use crate::llm::CompletionProvider;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const DEEPSEEK_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
const DEEPSEEK_MODEL: &str = "deepseek-ai/DeepSeek-V3";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vendor {
    DeepSeek,
    OpenAi,
}

/// Reusable chat completions client (connection-pooled)
pub struct ChatCompletionsProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    vendor: Vendor,
}

impl ChatCompletionsProvider {
    pub fn deepseek(api_key: String, model: Option<String>) -> Result<Self> {
        Self::build(Vendor::DeepSeek, api_key, model.unwrap_or_else(|| DEEPSEEK_MODEL.to_string()), DEEPSEEK_URL)
    }

    pub fn openai(api_key: String, model: Option<String>) -> Result<Self> {
        Self::build(Vendor::OpenAi, api_key, model.unwrap_or_else(|| OPENAI_MODEL.to_string()), OPENAI_URL)
    }

    /// Point the client at a different endpoint (proxies, self-hosted gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build(vendor: Vendor, api_key: String, model: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.to_string(),
            vendor,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let messages = vec![ChatMessage {
            role: "user",
            content: prompt,
        }];

        match self.vendor {
            Vendor::DeepSeek => ChatRequest {
                model: &self.model,
                messages,
                temperature: 0.7,
                max_tokens: 512,
                stream: Some(false),
                top_p: Some(0.7),
                top_k: Some(50),
                frequency_penalty: Some(0.5),
                n: Some(1),
            },
            Vendor::OpenAi => ChatRequest {
                model: &self.model,
                messages,
                temperature: 0.7,
                max_tokens: 500,
                stream: None,
                top_p: None,
                top_k: None,
                frequency_penalty: None,
                n: None,
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        match self.vendor {
            Vendor::DeepSeek => "deepseek",
            Vendor::OpenAi => "openai",
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        info!(provider = self.name(), model = %self.model, "Calling chat completions API");

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                error!("API request error: {}", e);
                RecommendationError::LlmError(format!("{} request failed: {}", self.name(), e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "API error response: {}", error_text);
            return Err(RecommendationError::LlmError(format!(
                "{} returned {}: {}",
                self.name(),
                status,
                error_text
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Error parsing API response: {}", e);
            RecommendationError::LlmError(format!("{} parse error: {}", self.name(), e))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                error!("Unexpected API response structure");
                RecommendationError::LlmError("unexpected response structure".to_string())
            })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let deepseek = ChatCompletionsProvider::deepseek("k".to_string(), None).unwrap();
        let json = serde_json::to_value(deepseek.request("Rate this Civic")).unwrap();
        assert_eq!(json["model"], DEEPSEEK_MODEL);
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["top_k"], 50);
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["content"], "Rate this Civic");

        let openai = ChatCompletionsProvider::openai("k".to_string(), Some("gpt-4o".to_string())).unwrap();
        let json = serde_json::to_value(openai.request("hi")).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 500);
        assert!(json.get("top_k").is_none());
        assert!(json.get("stream").is_none());
    }

    #[tokio::test]
    async fn test_generate_reads_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "Recommended."}}]
                }));
            })
            .await;

        let provider = ChatCompletionsProvider::openai("secret".to_string(), None)
            .unwrap()
            .with_base_url(server.url("/v1/chat/completions"));

        assert_eq!(provider.generate("prompt").await.unwrap(), "Recommended.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_choices_and_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/empty");
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/limited");
                then.status(429).body("rate limited");
            })
            .await;

        let empty = ChatCompletionsProvider::deepseek("k".to_string(), None)
            .unwrap()
            .with_base_url(server.url("/empty"));
        assert!(empty.generate("prompt").await.is_err());

        let limited = ChatCompletionsProvider::deepseek("k".to_string(), None)
            .unwrap()
            .with_base_url(server.url("/limited"));
        let err = limited.generate("prompt").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
