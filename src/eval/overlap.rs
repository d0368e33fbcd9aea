//! Lexical overlap scoring between source and transformed text.
//!
//! A smoothed sentence-level n-gram precision (orders 1-4, whitespace
//! tokens, clipped counts, brevity penalty). Style transfer is expected to
//! preserve the source words, so raw overlap is rescaled by a fixed
//! multiplier and clamped to 1.0: a transform keeping roughly a tenth of
//! the source n-gram mass already counts as full overlap.
//!
//! Smoothing is add-one on orders above 1 (Lin & Och 2004), which keeps a
//! single missing 4-gram from zeroing the whole geometric mean.

use std::collections::HashMap;

/// Highest n-gram order considered.
const MAX_ORDER: usize = 4;

/// Fixed multiplier applied to the raw score before clamping.
const RESCALE: f64 = 10.0;

/// Scores lexical overlap between reference and hypothesis strings.
#[derive(Default)]
pub struct OverlapEvaluator;

impl OverlapEvaluator {
    /// Create an overlap evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Raw smoothed n-gram precision score in [0,1].
    pub fn raw_overlap(&self, reference: &str, hypothesis: &str) -> f64 {
        let ref_tokens: Vec<&str> = reference.split_whitespace().collect();
        let hyp_tokens: Vec<&str> = hypothesis.split_whitespace().collect();

        if ref_tokens.is_empty() || hyp_tokens.is_empty() {
            return 0.0;
        }

        let max_order = MAX_ORDER.min(hyp_tokens.len()).min(ref_tokens.len());
        let mut log_precision_sum = 0.0;

        for order in 1..=max_order {
            let ref_counts = ngram_counts(&ref_tokens, order);
            let hyp_counts = ngram_counts(&hyp_tokens, order);

            let total: usize = hyp_counts.values().sum();
            let clipped: usize = hyp_counts
                .iter()
                .map(|(gram, count)| (*count).min(ref_counts.get(gram).copied().unwrap_or(0)))
                .sum();

            let precision = if order == 1 {
                if clipped == 0 {
                    return 0.0;
                }
                clipped as f64 / total as f64
            } else {
                (clipped + 1) as f64 / (total + 1) as f64
            };

            log_precision_sum += precision.ln();
        }

        let geometric_mean = (log_precision_sum / max_order as f64).exp();

        // Brevity penalty for hypotheses shorter than the reference.
        let brevity = if hyp_tokens.len() < ref_tokens.len() {
            (1.0 - ref_tokens.len() as f64 / hyp_tokens.len() as f64).exp()
        } else {
            1.0
        };

        geometric_mean * brevity
    }

    /// Rescaled score in [0,1], or `None` when either side is empty.
    pub fn score(&self, reference: &str, hypothesis: &str) -> Option<f64> {
        if reference.trim().is_empty() || hypothesis.trim().is_empty() {
            return None;
        }
        Some((self.raw_overlap(reference, hypothesis) * RESCALE).min(1.0))
    }

    /// Score a batch of records on (`content`, `transformed_content`).
    pub fn score_records(&self, records: &[serde_json::Value]) -> Vec<Option<f64>> {
        records
            .iter()
            .map(|record| {
                let reference = record.get("content").and_then(|v| v.as_str()).unwrap_or("");
                let hypothesis = record
                    .get("transformed_content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                self.score(reference, hypothesis)
            })
            .collect()
    }
}

fn ngram_counts<'a>(tokens: &[&'a str], order: usize) -> HashMap<Vec<&'a str>, usize> {
    let mut counts = HashMap::new();
    for window in tokens.windows(order) {
        *counts.entry(window.to_vec()).or_insert(0) += 1;
    }
    counts
}
