//! Semantic similarity scoring between source and transformed text.
//!
//! Both sides are truncated to a token budget, embedded through an
//! [`EmbeddingProvider`], and compared by cosine similarity clamped into
//! [0,1]. A good transform keeps the source meaning, so low similarity
//! flags records where the model drifted off-topic.

use std::sync::Arc;

use crate::error::EvalError;
use crate::llm::EmbeddingProvider;

/// Token budget applied to each side before embedding.
const MAX_TOKENS: u32 = 290;

/// Texts per embedding request.
const EMBED_BATCH_SIZE: usize = 64;

/// Truncate text to roughly `max_tokens` worth of characters, using the
/// ~4-chars-per-token heuristic. Truncation is by character so multi-byte
/// Korean text is never split mid-character.
pub fn truncate_to_token_budget(text: &str, max_tokens: u32) -> String {
    let max_chars = (max_tokens as usize) * 4;
    text.chars().take(max_chars).collect()
}

/// Cosine similarity of two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, EvalError> {
    if a.len() != b.len() {
        return Err(EvalError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Scores source/transform pairs by embedding cosine similarity.
pub struct SemanticEvaluator {
    provider: Arc<dyn EmbeddingProvider>,
    max_tokens: u32,
}

impl SemanticEvaluator {
    /// Create an evaluator over the given embedding provider.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            max_tokens: MAX_TOKENS,
        }
    }

    /// Override the truncation budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Similarity for one pair, clamped to [0,1].
    pub async fn score_pair(&self, source: &str, transformed: &str) -> Result<f64, EvalError> {
        let inputs = vec![
            truncate_to_token_budget(source, self.max_tokens),
            truncate_to_token_budget(transformed, self.max_tokens),
        ];
        let vectors = self.provider.embed(&inputs).await?;
        if vectors.len() != 2 {
            return Err(EvalError::Embedding(format!(
                "expected 2 embeddings, got {}",
                vectors.len()
            )));
        }
        Ok(cosine_similarity(&vectors[0], &vectors[1])?.clamp(0.0, 1.0))
    }

    /// Score a batch of records on (`content`, `transformed_content`).
    ///
    /// Records missing either side score `None`. Embeddings are fetched in
    /// bounded batches; within a batch, sources and transforms interleave.
    pub async fn score_records(
        &self,
        records: &[serde_json::Value],
    ) -> Result<Vec<Option<f64>>, EvalError> {
        let mut scores: Vec<Option<f64>> = vec![None; records.len()];

        // Gather the scorable pairs with their record index.
        let mut pending: Vec<(usize, String, String)> = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let source = record.get("content").and_then(|v| v.as_str()).unwrap_or("");
            let transformed = record
                .get("transformed_content")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if source.trim().is_empty() || transformed.trim().is_empty() {
                continue;
            }
            pending.push((
                index,
                truncate_to_token_budget(source, self.max_tokens),
                truncate_to_token_budget(transformed, self.max_tokens),
            ));
        }

        for chunk in pending.chunks(EMBED_BATCH_SIZE / 2) {
            let mut inputs = Vec::with_capacity(chunk.len() * 2);
            for (_, source, transformed) in chunk {
                inputs.push(source.clone());
                inputs.push(transformed.clone());
            }

            let vectors = self.provider.embed(&inputs).await?;
            if vectors.len() != inputs.len() {
                return Err(EvalError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    vectors.len()
                )));
            }

            for (pair_index, (record_index, _, _)) in chunk.iter().enumerate() {
                let source_vec = &vectors[pair_index * 2];
                let transform_vec = &vectors[pair_index * 2 + 1];
                let similarity = cosine_similarity(source_vec, transform_vec)?.clamp(0.0, 1.0);
                scores[*record_index] = Some(similarity);
            }
        }

        Ok(scores)
    }
}
