//! Single-item transform request with validation and bounded retry.
//!
//! One call renders the persona prompt, sends it through the provider (via
//! the key pool when one is attached), extracts the JSON object from the
//! reply and validates it against the request. Malformed or mismatched
//! replies, empty output and rate/quota errors are retried up to the policy
//! budget; exhausting the budget is a counted failure, not an escalation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::TransformRecord;
use crate::error::TransformError;
use crate::llm::{GenerationRequest, KeyPool, LlmProvider, Message};
use crate::prompts::{build_transform_prompt, Category, Emotion};
use crate::transform::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::utils::json_extraction::extract_json_object;

/// Decoding temperature for transform requests.
const TRANSFORM_TEMPERATURE: f64 = 0.3;
/// Nucleus sampling parameter for transform requests.
const TRANSFORM_TOP_P: f64 = 0.9;
/// Output token budget; transforms are capped at twice the source length.
const TRANSFORM_MAX_TOKENS: u32 = 400;

/// Reply shape the prompt contracts the model to produce.
///
/// The `content` echo is untrusted: models sometimes rewrite the source text
/// while copying it back, so validation replaces it with the known original.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransformReply {
    content: String,
    emotion: String,
    post_type: String,
    transformed_content: String,
}

/// Terminal failure for one work item, after retries.
#[derive(Debug)]
pub struct TransformFailure {
    /// The error from the final attempt.
    pub error: TransformError,
    /// Total model attempts made.
    pub attempts: u32,
}

/// Issues transform requests through an LLM provider.
pub struct Transformer {
    provider: Arc<dyn LlmProvider>,
    pool: Option<Arc<KeyPool>>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    model: String,
}

impl Transformer {
    /// Create a transformer with the default retry policy and real sleeping.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            pool: None,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            model: model.into(),
        }
    }

    /// Attach a key pool; each attempt acquires a fresh key, so retries after
    /// a quota error naturally rotate to a less-loaded credential.
    pub fn with_key_pool(mut self, pool: Arc<KeyPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the sleeper (tests inject a no-op recorder).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn build_request(&self, content: &str, category: Category, emotion: Emotion) -> GenerationRequest {
        let prompt = build_transform_prompt(content, category, emotion);
        GenerationRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .with_temperature(TRANSFORM_TEMPERATURE)
            .with_top_p(TRANSFORM_TOP_P)
            .with_max_tokens(TRANSFORM_MAX_TOKENS)
    }

    /// Transform one work item, retrying per the policy.
    pub async fn transform(
        &self,
        content: &str,
        category: Category,
        emotion: Emotion,
    ) -> Result<TransformRecord, TransformFailure> {
        let request = self.build_request(content, category, emotion);

        let mut attempts: u32 = 0;
        let mut pool_waits: u32 = 0;
        let mut last_error: Option<TransformError> = None;

        while attempts < self.policy.max_attempts {
            // Key acquisition happens before the attempt is counted: a
            // saturated pool is a backoff signal, not a model failure.
            let key = match &self.pool {
                Some(pool) => match pool.acquire() {
                    Some(key) => Some(key),
                    None => {
                        pool_waits += 1;
                        if pool_waits > self.policy.max_pool_waits {
                            return Err(TransformFailure {
                                error: TransformError::KeysExhausted,
                                attempts,
                            });
                        }
                        tracing::warn!(
                            wait_secs = self.policy.pool_wait.as_secs(),
                            "all keys saturated, backing off"
                        );
                        self.sleeper.sleep(self.policy.pool_wait).await;
                        continue;
                    }
                },
                None => None,
            };

            attempts += 1;

            let result = match key {
                Some(ref key) => self.provider.generate_with_key(request.clone(), key).await,
                None => self.provider.generate(request.clone()).await,
            };

            let (error, backoff) = match result {
                Ok(response) => {
                    match parse_reply(&response_text(&response), content, category, emotion) {
                        Ok(record) => {
                            tracing::debug!(%category, %emotion, attempts, "transform succeeded");
                            return Ok(record);
                        }
                        Err(error) => {
                            tracing::warn!(%category, %emotion, attempt = attempts, %error, "invalid reply");
                            (error, self.policy.invalid_reply_backoff(attempts))
                        }
                    }
                }
                Err(llm_error) if llm_error.is_rate_limited() => {
                    if let Some(pool) = &self.pool {
                        tracing::warn!(attempt = attempts, status = %pool.status(), "rate limited, rotating key");
                    } else {
                        tracing::warn!(attempt = attempts, "rate limited");
                    }
                    (
                        TransformError::Llm(llm_error),
                        self.policy.rate_limit_backoff(attempts),
                    )
                }
                Err(llm_error) => {
                    tracing::warn!(attempt = attempts, error = %llm_error, "request failed");
                    (
                        TransformError::Llm(llm_error),
                        self.policy.request_error_backoff(attempts),
                    )
                }
            };

            last_error = Some(error);
            if attempts < self.policy.max_attempts {
                self.sleeper.sleep(backoff).await;
            }
        }

        Err(TransformFailure {
            error: last_error.unwrap_or(TransformError::RetriesExhausted {
                attempts: self.policy.max_attempts,
            }),
            attempts,
        })
    }
}

fn response_text(response: &crate::llm::GenerationResponse) -> String {
    response.first_content().unwrap_or_default().to_string()
}

/// Parse and validate one model reply.
fn parse_reply(
    reply: &str,
    original_content: &str,
    category: Category,
    emotion: Emotion,
) -> Result<TransformRecord, TransformError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(TransformError::EmptyReply);
    }

    let json = extract_json_object(trimmed).ok_or_else(|| {
        let preview: String = trimmed.chars().take(80).collect();
        TransformError::NoJsonInReply(preview)
    })?;

    let parsed: TransformReply = serde_json::from_str(&json)
        .map_err(|e| TransformError::InvalidReply(e.to_string()))?;

    if parsed.post_type != category.as_str() || parsed.emotion != emotion.as_str() {
        return Err(TransformError::EchoMismatch {
            expected: format!("{}/{}", category, emotion),
            actual: format!("{}/{}", parsed.post_type, parsed.emotion),
        });
    }

    if parsed.transformed_content.trim().is_empty() {
        return Err(TransformError::InvalidReply(
            "empty transformed_content".to_string(),
        ));
    }

    Ok(TransformRecord {
        // Models sometimes echo the source text altered; keep the original.
        content: original_content.to_string(),
        emotion,
        post_type: category,
        transformed_content: parsed.transformed_content,
    })
}

/// Suitability verdict helper for the prefilter: interprets a bare
/// true/false reply, defaulting to false on anything unclear.
pub fn parse_suitability_reply(reply: &str) -> bool {
    reply.to_lowercase().contains("true")
}
