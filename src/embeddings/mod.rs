//! Embedding provider abstraction.
//!
//! Conversation memory embeds every turn through an [`EmbeddingClient`];
//! swapping providers is a configuration change, not a code change. Tests
//! supply deterministic mock embedders.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::EmbeddingsConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Trait for text embedding providers.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text into a vector.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or unparseable payloads.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Model identifier in use.
    fn model(&self) -> &str;
}

/// OpenAI embeddings API client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    config: EmbeddingsConfig,
    client: Client,
}

impl OpenAiEmbeddings {
    /// Create a new client from configuration.
    #[must_use]
    pub fn new(config: EmbeddingsConfig) -> Self {
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
        format!("{base}/v1/embeddings")
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
        });

        let mut request = self.client.post(self.api_url()).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("embeddings API error ({}): {}", status, text);
        }

        let payload: EmbeddingsResponse = response.json().await?;
        payload
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("embeddings API returned no vectors"))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Build an embedder from configuration.
pub fn create_embedder(config: &EmbeddingsConfig) -> std::sync::Arc<dyn EmbeddingClient> {
    std::sync::Arc::new(OpenAiEmbeddings::new(config.clone()))
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Cosine similarity between two vectors; 0.0 when either norm is zero or
/// the dimensions differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_dims() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
