//! Embedding client for OpenAI-compatible `/embeddings` endpoints.
//!
//! The semantic-similarity evaluator scores source/transformed pairs by
//! cosine similarity of their embeddings. The provider seam is a trait so the
//! evaluator can be tested against fixed vectors.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Trait for services that can embed batches of text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each input text, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

/// Client for OpenAI-compatible embedding APIs.
pub struct EmbeddingClient {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http_client: Client,
}

impl EmbeddingClient {
    /// Create a new embedding client.
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create an embedding client from environment variables.
    ///
    /// Reads `PETFORGE_API_BASE` (required), `PETFORGE_API_KEY` (optional)
    /// and `PETFORGE_EMBED_MODEL` (defaults to "text-embedding-004").
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("PETFORGE_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("PETFORGE_API_KEY").ok();
        let model =
            env::var("PETFORGE_EMBED_MODEL").unwrap_or_else(|_| "text-embedding-004".to_string());

        Ok(Self::new(api_base, api_key, model))
    }

    /// Embedding model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.api_base);
        let body = EmbeddingApiRequest {
            model: &self.model,
            input: texts,
        };

        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }

        let http_response = http_request
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let message = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let api_response: EmbeddingApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse embeddings: {}", e)))?;

        // The API is allowed to return data out of order; restore input order.
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for datum in api_response.data {
            if datum.index >= vectors.len() {
                return Err(LlmError::ParseError(format!(
                    "embedding index {} out of range for {} inputs",
                    datum.index,
                    texts.len()
                )));
            }
            vectors[datum.index] = datum.embedding;
        }

        Ok(vectors)
    }
}
