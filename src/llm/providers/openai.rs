//! OpenAI-compatible provider client.
//!
//! Supports the OpenAI chat completions API and Azure OpenAI deployments
//! (the Azure route differs only in URL shape and auth header).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::{LlmConfig, LlmProviderKind};
use crate::llm::{LlmClient, LlmRequest, LlmResponse, Message, MessageRole};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const AZURE_API_VERSION: &str = "2024-02-15-preview";

/// OpenAI and Azure OpenAI chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

impl OpenAiClient {
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

        if self.config.provider == LlmProviderKind::Azure {
            let deployment = self
                .config
                .deployment
                .as_deref()
                .unwrap_or(&self.config.model);
            format!(
                "{base}/openai/deployments/{deployment}/chat/completions?api-version={AZURE_API_VERSION}"
            )
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": match msg.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    "content": msg.content,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": Self::convert_messages(&req.messages),
            "temperature": req.temperature.unwrap_or(self.config.temperature),
            "max_tokens": req.max_tokens.unwrap_or(self.config.max_tokens),
        });

        let mut request = self.client.post(self.api_url()).json(&body);

        if let Some(ref api_key) = self.config.api_key {
            request = if self.config.provider == LlmProviderKind::Azure {
                request.header("api-key", api_key)
            } else {
                request.header("Authorization", format!("Bearer {api_key}"))
            };
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, text);
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: completion.model,
            prompt_tokens: completion.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: completion.usage.as_ref().map(|u| u.completion_tokens),
        })
    }

    fn provider(&self) -> LlmProviderKind {
        self.config.provider
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_url() {
        let client = OpenAiClient::new(LlmConfig::default());
        assert_eq!(client.api_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_azure_url_uses_deployment() {
        let config = LlmConfig {
            provider: LlmProviderKind::Azure,
            base_url: Some("https://example.openai.azure.com/".to_string()),
            deployment: Some("gpt4-prod".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(config);
        let url = client.api_url();
        assert!(url.starts_with("https://example.openai.azure.com/openai/deployments/gpt4-prod/"));
        assert!(url.contains("api-version="));
    }

    #[test]
    fn test_convert_messages_roles() {
        let converted = OpenAiClient::convert_messages(&[
            Message::system("s"),
            Message::user("u"),
            Message::assistant("a"),
        ]);
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[2]["role"], "assistant");
        assert_eq!(converted[1]["content"], "u");
    }
}
