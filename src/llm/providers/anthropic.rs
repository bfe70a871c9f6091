//! Anthropic Claude provider client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::{LlmConfig, LlmProviderKind};
use crate::llm::{LlmClient, LlmRequest, LlmResponse, Message, MessageRole};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    config: LlmConfig,
    client: Client,
}

impl AnthropicClient {
    /// Create a new client from configuration.
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn api_url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    /// Anthropic takes the system prompt as a top-level field; user and
    /// assistant turns go in the messages array.
    fn split_messages(messages: &[Message]) -> (String, Vec<serde_json::Value>) {
        let mut system = String::new();
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => {
                    if !system.is_empty() {
                        system.push_str("\n\n");
                    }
                    system.push_str(&msg.content);
                }
                MessageRole::User => {
                    converted.push(serde_json::json!({"role": "user", "content": msg.content}));
                }
                MessageRole::Assistant => {
                    converted
                        .push(serde_json::json!({"role": "assistant", "content": msg.content}));
                }
            }
        }

        (system, converted)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse> {
        let (system, messages) = Self::split_messages(&req.messages);

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": req.temperature.unwrap_or(self.config.temperature),
            "max_tokens": req.max_tokens.unwrap_or(self.config.max_tokens),
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system);
        }

        let mut request = self
            .client
            .post(self.api_url())
            .header("anthropic-version", API_VERSION)
            .json(&body);

        if let Some(ref api_key) = self.config.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({}): {}", status, text);
        }

        let message: AnthropicMessage = response.json().await?;
        let content = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            content,
            model: message.model,
            prompt_tokens: message.usage.as_ref().map(|u| u.input_tokens),
            completion_tokens: message.usage.as_ref().map(|u| u.output_tokens),
        })
    }

    fn provider(&self) -> LlmProviderKind {
        LlmProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_messages_hoists_system() {
        let (system, messages) = AnthropicClient::split_messages(&[
            Message::system("be precise"),
            Message::user("hello"),
            Message::assistant("hi"),
        ]);
        assert_eq!(system, "be precise");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_api_url_default() {
        let client = AnthropicClient::new(LlmConfig::default());
        assert_eq!(client.api_url(), "https://api.anthropic.com/v1/messages");
    }
}
