//! Fluency scoring via character n-gram perplexity.
//!
//! A Laplace-smoothed character trigram model is trained on the run's own
//! source captions and used to compute perplexity over each transformed
//! text. Raw perplexity maps to a discrete score through a policy table in
//! which a *middle* band is best: persona speak is deliberately non-standard
//! Korean, so text the reference model finds too predictable has usually
//! lost the persona, and text it finds wildly surprising is usually broken.
//!
//! The default bands were tuned against a specific reference model and
//! corpus; treat them as policy, not as universal constants.

use std::collections::{HashMap, HashSet};

use crate::error::EvalError;

/// Default n-gram order.
const DEFAULT_ORDER: usize = 3;

/// Start-of-text padding marker.
const START_MARK: char = '\u{2402}';
/// End-of-text marker.
const END_MARK: char = '\u{2403}';

/// One scoring band: perplexity in `[low, high]` earns `score`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyBand {
    pub low: f64,
    pub high: f64,
    pub score: f64,
}

/// Perplexity-to-score policy table.
///
/// Bands are evaluated in order, first match wins, so later bands may
/// enclose earlier ones to express "everything else this far out". A
/// perplexity outside every band earns the fallback score.
#[derive(Debug, Clone, PartialEq)]
pub struct FluencyPolicy {
    bands: Vec<PolicyBand>,
    fallback: f64,
}

impl Default for FluencyPolicy {
    fn default() -> Self {
        Self {
            bands: vec![
                PolicyBand { low: 60.0, high: 180.0, score: 1.0 },
                PolicyBand { low: 35.0, high: 350.0, score: 0.8 },
                PolicyBand { low: 20.0, high: 700.0, score: 0.6 },
                PolicyBand { low: 20.0, high: 2000.0, score: 0.4 },
            ],
            fallback: 0.2,
        }
    }
}

impl FluencyPolicy {
    /// Build a custom policy.
    pub fn new(bands: Vec<PolicyBand>, fallback: f64) -> Self {
        Self { bands, fallback }
    }

    /// Map a raw perplexity to its band score.
    pub fn score(&self, perplexity: f64) -> f64 {
        for band in &self.bands {
            if perplexity >= band.low && perplexity <= band.high {
                return band.score;
            }
        }
        self.fallback
    }
}

/// Laplace-smoothed character n-gram language model.
pub struct NgramFluencyModel {
    order: usize,
    ngram_counts: HashMap<String, usize>,
    context_counts: HashMap<String, usize>,
    vocab: HashSet<char>,
    smoothing: f64,
}

impl NgramFluencyModel {
    /// Create an untrained model of the given order (>= 2).
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(2),
            ngram_counts: HashMap::new(),
            context_counts: HashMap::new(),
            vocab: HashSet::new(),
            smoothing: 1.0,
        }
    }

    /// Create the default character trigram model.
    pub fn trigram() -> Self {
        Self::new(DEFAULT_ORDER)
    }

    fn padded_chars(&self, text: &str) -> Vec<char> {
        let mut chars: Vec<char> = Vec::with_capacity(text.chars().count() + self.order);
        for _ in 0..self.order - 1 {
            chars.push(START_MARK);
        }
        chars.extend(text.chars());
        chars.push(END_MARK);
        chars
    }

    /// Count n-grams from a training text.
    pub fn observe(&mut self, text: &str) {
        let chars = self.padded_chars(text);
        for &c in &chars {
            self.vocab.insert(c);
        }

        for window in chars.windows(self.order) {
            let ngram: String = window.iter().collect();
            *self.ngram_counts.entry(ngram).or_insert(0) += 1;

            let context: String = window[..self.order - 1].iter().collect();
            *self.context_counts.entry(context).or_insert(0) += 1;
        }
    }

    /// Train on a whole corpus.
    pub fn train<'a>(&mut self, texts: impl IntoIterator<Item = &'a str>) {
        for text in texts {
            self.observe(text);
        }
    }

    /// Whether any training text has been observed.
    pub fn is_trained(&self) -> bool {
        !self.ngram_counts.is_empty()
    }

    /// Perplexity of a text under the model (lower = more predictable).
    pub fn perplexity(&self, text: &str) -> Result<f64, EvalError> {
        if !self.is_trained() {
            return Err(EvalError::UntrainedModel);
        }

        let chars = self.padded_chars(text);
        let windows: Vec<_> = chars.windows(self.order).collect();
        if windows.is_empty() {
            return Err(EvalError::UntrainedModel);
        }

        let vocab_size = self.vocab.len() as f64;
        let mut log_prob_sum = 0.0;

        for window in &windows {
            let ngram: String = window.iter().collect();
            let context: String = window[..self.order - 1].iter().collect();

            let ngram_count = self.ngram_counts.get(&ngram).copied().unwrap_or(0) as f64;
            let context_count = self.context_counts.get(&context).copied().unwrap_or(0) as f64;

            let prob = (ngram_count + self.smoothing)
                / (context_count + self.smoothing * vocab_size);
            log_prob_sum += prob.ln();
        }

        let avg_log_prob = log_prob_sum / windows.len() as f64;
        Ok((-avg_log_prob).exp())
    }
}

/// Scores fluency of transformed text against a reference model.
pub struct FluencyEvaluator {
    model: NgramFluencyModel,
    policy: FluencyPolicy,
}

impl FluencyEvaluator {
    /// Build an evaluator trained on the given reference corpus.
    pub fn from_corpus<'a>(corpus: impl IntoIterator<Item = &'a str>) -> Self {
        let mut model = NgramFluencyModel::trigram();
        model.train(corpus);
        Self {
            model,
            policy: FluencyPolicy::default(),
        }
    }

    /// Override the scoring policy table.
    pub fn with_policy(mut self, policy: FluencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Score one text; scoring failure maps to 0.0 rather than an error so
    /// a single bad record cannot sink a batch.
    pub fn score(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        match self.model.perplexity(text) {
            Ok(ppl) => self.policy.score(ppl),
            Err(e) => {
                tracing::warn!(error = %e, "perplexity computation failed");
                0.0
            }
        }
    }

    /// Raw perplexity for one text, for reporting.
    pub fn raw_perplexity(&self, text: &str) -> Option<f64> {
        self.model.perplexity(text).ok()
    }

    /// Score a batch of records on `transformed_content`.
    pub fn score_records(&self, records: &[serde_json::Value]) -> Vec<Option<f64>> {
        records
            .iter()
            .map(|record| {
                let text = record
                    .get("transformed_content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                Some(self.score(text))
            })
            .collect()
    }
}
