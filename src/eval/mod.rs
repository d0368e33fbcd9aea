//! Multi-metric record evaluation.
//!
//! Five independent, stateless scorers each map a record to a scalar in
//! [0,1]. Every requested scorer runs over the full record set on its own;
//! results are merged positionally (by line index) into one output record
//! per input line, regardless of which scorers were requested. A scorer
//! that cannot produce a value for a record writes an explicit null so
//! downstream consumers see the gap.

pub mod fluency;
pub mod overlap;
pub mod quality;
pub mod semantic;
pub mod style;

pub use fluency::{FluencyEvaluator, FluencyPolicy, NgramFluencyModel, PolicyBand};
pub use overlap::OverlapEvaluator;
pub use quality::{QualityEvaluator, QualityScore};
pub use semantic::SemanticEvaluator;
pub use style::StyleEvaluator;

use serde_json::Value;
use std::sync::Arc;

use crate::error::EvalError;
use crate::llm::EmbeddingProvider;

/// Output field written by the semantic-similarity scorer.
pub const SEMANTIC_FIELD: &str = "kobertscore_f1";
/// Output field written by the style scorer.
pub const STYLE_FIELD: &str = "type_score";
/// Output field written by the quality scorer.
pub const QUALITY_FIELD: &str = "quality_score";
/// Output field written by the lexical-overlap scorer.
pub const OVERLAP_FIELD: &str = "bleu_score";
/// Output field written by the fluency scorer.
pub const FLUENCY_FIELD: &str = "perplexity_score";

/// All score fields, in reporting order.
pub const SCORE_FIELDS: [&str; 5] = [
    SEMANTIC_FIELD,
    STYLE_FIELD,
    QUALITY_FIELD,
    OVERLAP_FIELD,
    FLUENCY_FIELD,
];

/// Which scorers to run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalSelection {
    pub semantic: bool,
    pub style: bool,
    pub quality: bool,
    pub overlap: bool,
    pub fluency: bool,
}

impl EvalSelection {
    /// Selection with every scorer enabled.
    pub fn all() -> Self {
        Self {
            semantic: true,
            style: true,
            quality: true,
            overlap: true,
            fluency: true,
        }
    }

    /// Whether at least one scorer is enabled.
    pub fn any(&self) -> bool {
        self.semantic || self.style || self.quality || self.overlap || self.fluency
    }
}

/// Runs the selected scorers and merges their outputs into the records.
pub struct EvalRunner {
    selection: EvalSelection,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl EvalRunner {
    /// Create a runner for the given selection. The embedder is only needed
    /// when the semantic scorer is selected.
    pub fn new(selection: EvalSelection, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            selection,
            embedder,
        }
    }

    /// Evaluate records in place, adding one score field per selected
    /// scorer to every record.
    pub async fn evaluate(&self, records: &mut [Value]) -> Result<(), EvalError> {
        if self.selection.semantic {
            let embedder = self
                .embedder
                .clone()
                .ok_or_else(|| EvalError::Embedding("no embedding provider configured".into()))?;
            let scores = SemanticEvaluator::new(embedder).score_records(records).await?;
            merge_scores(records, SEMANTIC_FIELD, &scores);
            tracing::info!(metric = SEMANTIC_FIELD, "scorer complete");
        }

        if self.selection.style {
            let scores = StyleEvaluator::new().score_records(records);
            merge_scores(records, STYLE_FIELD, &scores);
            tracing::info!(metric = STYLE_FIELD, "scorer complete");
        }

        if self.selection.quality {
            let scores = QualityEvaluator::new().score_records(records);
            merge_scores(records, QUALITY_FIELD, &scores);
            tracing::info!(metric = QUALITY_FIELD, "scorer complete");
        }

        if self.selection.overlap {
            let scores = OverlapEvaluator::new().score_records(records);
            merge_scores(records, OVERLAP_FIELD, &scores);
            tracing::info!(metric = OVERLAP_FIELD, "scorer complete");
        }

        if self.selection.fluency {
            // The fluency reference model trains on this run's own sources.
            let corpus: Vec<String> = records
                .iter()
                .filter_map(|r| r.get("content").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect();
            let evaluator = FluencyEvaluator::from_corpus(corpus.iter().map(|s| s.as_str()));
            let scores = evaluator.score_records(records);
            merge_scores(records, FLUENCY_FIELD, &scores);
            tracing::info!(metric = FLUENCY_FIELD, "scorer complete");
        }

        Ok(())
    }
}

/// Merge a score column into the records by position.
fn merge_scores(records: &mut [Value], field: &str, scores: &[Option<f64>]) {
    for (record, score) in records.iter_mut().zip(scores.iter()) {
        if let Some(map) = record.as_object_mut() {
            let value = match score {
                Some(s) => serde_json::Number::from_f64(*s)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                None => Value::Null,
            };
            map.insert(field.to_string(), value);
        }
    }
}
