//! Corpus prefilter: cheap rules first, then an LLM suitability check.
//!
//! Scraped captions are mostly unusable as style-transfer sources. The rule
//! stage removes the obvious rejects (too short, hashtag walls, adoption
//! notices, English-heavy posts) for free; survivors go through a bounded
//! pool of concurrent true/false LLM verdicts.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::prompts::build_suitability_prompt;
use crate::transform::{parse_suitability_reply, RetryPolicy, Sleeper, TokioSleeper};

/// Rule thresholds for the cheap prefilter stage.
#[derive(Debug, Clone)]
pub struct PrefilterRules {
    /// Minimum caption length in characters.
    pub min_length: usize,
    /// Maximum caption length in characters.
    pub max_length: usize,
    /// Hard cap on hashtag count.
    pub max_hashtags: usize,
    /// Maximum share of ASCII-letter characters.
    pub max_english_ratio: f64,
    /// At least one of these must appear.
    pub required_keywords: Vec<String>,
    /// None of these may appear.
    pub excluded_keywords: Vec<String>,
}

impl Default for PrefilterRules {
    fn default() -> Self {
        Self {
            min_length: 20,
            max_length: 200,
            max_hashtags: 10,
            max_english_ratio: 0.3,
            required_keywords: ["고양이", "냥이", "강아지", "냥", "야옹", "집사", "멍", "묘"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_keywords: ["임보", "임시보호", "평생가족", "협찬"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PrefilterRules {
    /// Whether a caption survives the rule stage.
    pub fn passes(&self, text: &str) -> bool {
        let trimmed = text.trim();
        let char_count = trimmed.chars().count();
        if char_count < self.min_length || text.chars().count() > self.max_length {
            return false;
        }

        let hashtags = text.matches('#').count();
        let spaces = text.matches(' ').count();
        // Hashtag walls: more tags than half the words is tag spam.
        if hashtags > self.max_hashtags || hashtags * 2 > spaces.max(1) {
            return false;
        }

        let lower = text.to_lowercase();
        if !self.required_keywords.iter().any(|k| lower.contains(k.as_str())) {
            return false;
        }
        if self.excluded_keywords.iter().any(|k| text.contains(k.as_str())) {
            return false;
        }

        let english_chars = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
        if english_chars as f64 > char_count as f64 * self.max_english_ratio {
            return false;
        }

        true
    }

    /// Apply the rule stage to a whole corpus.
    pub fn apply(&self, texts: &[String]) -> Vec<String> {
        let kept: Vec<String> = texts.iter().filter(|t| self.passes(t)).cloned().collect();
        tracing::info!(
            input = texts.len(),
            kept = kept.len(),
            "rule prefilter complete"
        );
        kept
    }
}

/// LLM-backed suitability filter over rule survivors.
pub struct Prefilter {
    provider: Arc<dyn LlmProvider>,
    rules: PrefilterRules,
    model: String,
    max_workers: usize,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Prefilter {
    /// Create a prefilter with default rules and a worker pool of 5.
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            rules: PrefilterRules::default(),
            model: model.into(),
            max_workers: 5,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Override the rule thresholds.
    pub fn with_rules(mut self, rules: PrefilterRules) -> Self {
        self.rules = rules;
        self
    }

    /// Override the concurrent verdict count.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Override the sleeper used for verdict retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn verdict(&self, text: &str) -> bool {
        let prompt = build_suitability_prompt(text);
        let request = GenerationRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .with_temperature(0.0)
            .with_max_tokens(10);

        for attempt in 1..=self.policy.max_attempts {
            match self.provider.generate(request.clone()).await {
                Ok(response) => {
                    return response
                        .first_content()
                        .map(parse_suitability_reply)
                        .unwrap_or(false);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "suitability check failed");
                    if attempt < self.policy.max_attempts {
                        self.sleeper
                            .sleep(self.policy.request_error_backoff(attempt))
                            .await;
                    }
                }
            }
        }

        // Out of retries: reject rather than let junk through.
        false
    }

    /// Run rules then concurrent LLM verdicts, keeping input order.
    /// Stops early once `target` suitable captions are collected.
    pub async fn run(&self, texts: &[String], target: Option<usize>) -> Vec<String> {
        let candidates = self.rules.apply(texts);

        let mut kept = Vec::new();
        let mut verdicts = stream::iter(candidates.into_iter().map(|text| async move {
            let suitable = self.verdict(&text).await;
            (text, suitable)
        }))
        .buffered(self.max_workers);

        while let Some((text, suitable)) = verdicts.next().await {
            if suitable {
                kept.push(text);
                if target.map(|t| kept.len() >= t).unwrap_or(false) {
                    break;
                }
            }
        }

        tracing::info!(kept = kept.len(), "suitability filter complete");
        kept
    }
}
