//! Text embedding providers.
//!
//! [`EmbeddingProvider`] is the seam between the retrieval engine and the
//! embedding model. The production implementation calls the Gemini
//! `embedContent` endpoint; [`MockEmbeddingProvider`] produces deterministic
//! vectors for tests without any network traffic.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{EMBEDDING_MODEL, GatewayConfig};
use crate::errors::EmbeddingError;

/// Converts text into a fixed-length numeric vector.
///
/// Implementations perform no internal retries: a transient upstream failure
/// surfaces as [`EmbeddingError::Provider`] on the first attempt.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Fails with [`EmbeddingError::EmptyInput`] when
    /// the text is empty after trimming.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Embedding provider backed by the Gemini `embedContent` endpoint.
///
/// Constructed explicitly from configuration with an injected HTTP client;
/// there is no process-wide client state.
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    api_key: Option<String>,
}

impl GeminiEmbeddingProvider {
    pub fn new(client: reqwest::Client, config: &GatewayConfig) -> Self {
        Self {
            client,
            base_url: config.gemini_base_url.clone(),
            api_version: config.gemini_api_version.clone(),
            api_key: config.gemini_api_key.clone(),
        }
    }

    fn endpoint(&self, api_key: &str) -> String {
        format!(
            "{}/{}/models/{}:embedContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            EMBEDDING_MODEL,
            api_key
        )
    }
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let api_key = self.api_key.as_deref().ok_or(EmbeddingError::Provider {
            message: "GEMINI_API_KEY is not set".to_string(),
        })?;

        let body = json!({
            "content": { "parts": [{ "text": text }] }
        });

        let response = self
            .client
            .post(self.endpoint(api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| EmbeddingError::Provider {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                message: format!("embedContent returned {status}: {detail}"),
            });
        }

        let parsed: EmbedContentResponse =
            response.json().await.map_err(|err| EmbeddingError::Provider {
                message: err.to_string(),
            })?;
        Ok(parsed.embedding.values)
    }
}

/// Deterministic embedding provider for tests.
///
/// Produces a unit-length vector derived from the byte content of the input,
/// so identical texts embed identically and different texts (almost always)
/// differ.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub const DEFAULT_DIMENSIONS: usize = 8;

    pub fn new() -> Self {
        Self {
            dimensions: Self::DEFAULT_DIMENSIONS,
        }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let mut values = vec![0.0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            values[i % self.dimensions] += f32::from(byte) / 255.0;
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("Hello world").await.unwrap();
        let b = provider.embed("Hello world").await.unwrap();
        let c = provider.embed("Goodbye world").await.unwrap();
        assert_eq!(a, b, "identical text should embed identically");
        assert_ne!(a, c, "different text should embed differently");
    }

    #[tokio::test]
    async fn empty_input_is_rejected_after_trimming() {
        let provider = MockEmbeddingProvider::new();
        let err = provider.embed("   \n ").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyInput));
    }

    #[tokio::test]
    async fn mock_vectors_are_unit_length() {
        let provider = MockEmbeddingProvider::new();
        let v = provider.embed("some text").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
