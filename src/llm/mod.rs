//! Completion providers and the client the recommendation core talks to
//!
//! Backends implement the fallible `CompletionProvider`. The core only sees
//! `Completion`, whose contract is an empty string on any failure.

use crate::config::LlmConfig;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info};

pub mod anthropic;
pub mod chat;

pub use anthropic::AnthropicProvider;
pub use chat::ChatCompletionsProvider;

/// A text-generation backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Text completion as the recommendation core consumes it.
///
/// Implementations never fail: an empty string signals that no usable
/// response was produced.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> String;
}

/// Select a backend from configuration.
///
/// Returns `None` when no API key is set or the provider name is unknown.
pub fn build_provider(config: &LlmConfig) -> Option<Box<dyn CompletionProvider>> {
    if config.api_key.trim().is_empty() {
        error!("No API key provided for LLM provider");
        return None;
    }

    let api_key = config.api_key.clone();
    let model = config.model.clone();

    let built = match config.provider.trim().to_lowercase().as_str() {
        "deepseek" => ChatCompletionsProvider::deepseek(api_key, model)
            .map(|p| Box::new(p) as Box<dyn CompletionProvider>),
        "openai" => ChatCompletionsProvider::openai(api_key, model)
            .map(|p| Box::new(p) as Box<dyn CompletionProvider>),
        "anthropic" => AnthropicProvider::new(api_key, model)
            .map(|p| Box::new(p) as Box<dyn CompletionProvider>),
        other => {
            error!(provider = %other, "Unsupported LLM provider");
            return None;
        }
    };

    match built {
        Ok(provider) => {
            info!(provider = provider.name(), "LLM provider initialized");
            Some(provider)
        }
        Err(e) => {
            error!("Failed to initialize LLM provider: {}", e);
            None
        }
    }
}

/// Wraps an optional provider behind the never-failing `Completion` contract
pub struct CompletionClient {
    provider: Option<Box<dyn CompletionProvider>>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(provider: Option<Box<dyn CompletionProvider>>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(build_provider(config), config.timeout)
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}

#[async_trait]
impl Completion for CompletionClient {
    async fn complete(&self, prompt: &str) -> String {
        let Some(provider) = &self.provider else {
            error!("No LLM provider initialized");
            return String::new();
        };

        debug!(provider = provider.name(), prompt_chars = prompt.len(), "Requesting completion");

        match tokio::time::timeout(self.timeout, provider.generate(prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!(provider = provider.name(), "Completion failed: {}", e);
                String::new()
            }
            Err(_) => {
                error!(
                    provider = provider.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Completion timed out"
                );
                String::new()
            }
        }
    }
}

/// Scripted completion for development & testing.
///
/// Hands out queued responses in order, then repeats the fallback.
pub struct MockCompletion {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    /// Always answer with `response`
    pub fn new(response: impl Into<String>) -> Self {
        Self::with_responses(Vec::<String>::new(), response)
    }

    pub fn with_responses<S: Into<String>>(responses: Vec<S>, fallback: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: fallback.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Completion for MockCompletion {
    async fn complete(&self, prompt: &str) -> String {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommendationError;

    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RecommendationError::LlmError("upstream unavailable".to_string()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl CompletionProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    #[test]
    fn test_build_provider_requires_key_and_known_name() {
        let mut config = LlmConfig::default();
        assert!(build_provider(&config).is_none());

        config.api_key = "key".to_string();
        config.provider = "DeepSeek".to_string();
        assert_eq!(build_provider(&config).map(|p| p.name().to_string()).as_deref(), Some("deepseek"));

        config.provider = "anthropic".to_string();
        assert_eq!(build_provider(&config).map(|p| p.name().to_string()).as_deref(), Some("anthropic"));

        config.provider = "llama".to_string();
        assert!(build_provider(&config).is_none());
    }

    #[tokio::test]
    async fn test_client_without_provider_returns_empty() {
        let client = CompletionClient::new(None, Duration::from_secs(1));
        assert!(!client.is_available());
        assert_eq!(client.complete("prompt").await, "");
    }

    #[tokio::test]
    async fn test_client_swallows_provider_errors() {
        let client = CompletionClient::new(Some(Box::new(FailingProvider)), Duration::from_secs(1));
        assert_eq!(client.complete("prompt").await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_times_out() {
        let client = CompletionClient::new(Some(Box::new(SlowProvider)), Duration::from_secs(1));
        assert_eq!(client.complete("prompt").await, "");
    }

    #[tokio::test]
    async fn test_mock_completion_script() {
        let mock = MockCompletion::with_responses(vec!["first", ""], "rest");
        assert_eq!(mock.complete("a").await, "first");
        assert_eq!(mock.complete("b").await, "");
        assert_eq!(mock.complete("c").await, "rest");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.prompts(), vec!["a", "b", "c"]);
    }
}
