//! Chat-model client traits and implementations.
//!
//! The [`LlmClient`] trait defines the completion interface all providers
//! implement. Every consumer in this crate acts on whole completions (the
//! graph routes on parsed responses), so the interface is non-streaming.
//!
//! # Clients
//!
//! - [`providers::OpenAiClient`]: OpenAI, Azure OpenAI, and compatible APIs
//! - [`providers::AnthropicClient`]: Anthropic Claude API

pub mod parse;
pub mod providers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, LlmProviderKind};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Temperature override.
    pub temperature: Option<f32>,
    /// Max tokens override.
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Create a request from messages.
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this call.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A completed model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Full text content.
    pub content: String,
    /// Model that produced the response.
    pub model: Option<String>,
    /// Prompt tokens consumed.
    pub prompt_tokens: Option<u32>,
    /// Completion tokens generated.
    pub completion_tokens: Option<u32>,
}

/// Trait for chat completion clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a completion and return the full response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-success status codes, or
    /// unparseable provider payloads.
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse>;

    /// Provider type.
    fn provider(&self) -> LlmProviderKind;

    /// Model identifier in use.
    fn model(&self) -> &str;
}

/// Build a client from configuration.
pub fn create_client(config: &LlmConfig) -> std::sync::Arc<dyn LlmClient> {
    match config.provider {
        LlmProviderKind::OpenAi | LlmProviderKind::Azure => {
            std::sync::Arc::new(providers::OpenAiClient::new(config.clone()))
        }
        LlmProviderKind::Anthropic => {
            std::sync::Arc::new(providers::AnthropicClient::new(config.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let m = Message::system("you are helpful");
        assert_eq!(m.role, MessageRole::System);
        let m = Message::user("hi");
        assert_eq!(m.role, MessageRole::User);
        let m = Message::assistant("hello");
        assert_eq!(m.role, MessageRole::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
