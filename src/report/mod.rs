//! Evaluation reporting: per-metric means, threshold counts, per-file
//! summaries and threshold-based export.
//!
//! This is the data backend the scoring dashboard reads; chart rendering
//! itself lives outside this crate.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::dataset::{read_jsonl_values, write_jsonl};
use crate::error::EvalError;
use crate::eval::SCORE_FIELDS;

/// Default "bad data" threshold per metric.
pub fn default_threshold(metric: &str) -> f64 {
    match metric {
        "kobertscore_f1" => 0.6,
        "type_score" => 0.8,
        "quality_score" => 0.8,
        "bleu_score" => 0.4,
        "perplexity_score" => 0.5,
        _ => 0.5,
    }
}

/// Aggregate statistics for one metric over one record set.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricStats {
    /// Metric field name.
    pub metric: String,
    /// Mean over records carrying a value.
    pub mean: f64,
    /// Records carrying a value for this metric.
    pub count: usize,
    /// Records scoring strictly below the threshold.
    pub below_threshold: usize,
    /// Threshold used for the bad-data count.
    pub threshold: f64,
}

fn metric_values(records: &[Value], metric: &str) -> Vec<f64> {
    records
        .iter()
        .filter_map(|r| r.get(metric).and_then(|v| v.as_f64()))
        .collect()
}

/// Summarize every known score field present in the record set.
pub fn summarize(records: &[Value]) -> Vec<MetricStats> {
    SCORE_FIELDS
        .iter()
        .filter_map(|metric| {
            let values = metric_values(records, metric);
            if values.is_empty() {
                return None;
            }
            let threshold = default_threshold(metric);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let below_threshold = values.iter().filter(|v| **v < threshold).count();
            Some(MetricStats {
                metric: metric.to_string(),
                mean,
                count: values.len(),
                below_threshold,
                threshold,
            })
        })
        .collect()
}

/// Log a stats block the way run output is usually read.
pub fn log_summary(stats: &[MetricStats]) {
    for stat in stats {
        tracing::info!(
            metric = %stat.metric,
            mean = format!("{:.3}", stat.mean),
            bad = stat.below_threshold,
            total = stat.count,
            threshold = stat.threshold,
            "metric summary"
        );
    }
}

/// Keep the records whose every listed metric is present and at or above
/// its threshold.
pub fn filter_by_thresholds(records: &[Value], thresholds: &[(String, f64)]) -> Vec<Value> {
    records
        .iter()
        .filter(|record| {
            thresholds.iter().all(|(metric, threshold)| {
                record
                    .get(metric)
                    .and_then(|v| v.as_f64())
                    .map(|v| v >= *threshold)
                    .unwrap_or(false)
            })
        })
        .cloned()
        .collect()
}

/// Export the records passing every threshold to a new JSONL file.
pub fn export_filtered(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    thresholds: &[(String, f64)],
) -> Result<(usize, usize), EvalError> {
    let records = read_jsonl_values(input.as_ref()).map_err(io_from_dataset)?;
    let kept = filter_by_thresholds(&records, thresholds);
    write_jsonl(output.as_ref(), &kept).map_err(io_from_dataset)?;
    tracing::info!(
        read = records.len(),
        kept = kept.len(),
        output = %output.as_ref().display(),
        "threshold export complete"
    );
    Ok((records.len(), kept.len()))
}

fn io_from_dataset(err: crate::error::DatasetError) -> EvalError {
    match err {
        crate::error::DatasetError::Io(e) => EvalError::Io(e),
        crate::error::DatasetError::Json(e) => EvalError::Json(e),
        other => EvalError::Embedding(other.to_string()),
    }
}

/// Per-file metric means for a directory of cached evaluation outputs.
#[derive(Debug)]
pub struct FileMeans {
    /// Evaluated file.
    pub path: PathBuf,
    /// Metric name -> mean value.
    pub means: BTreeMap<String, f64>,
    /// Record count in the file.
    pub records: usize,
}

/// Walk a directory for `.jsonl` evaluation outputs and compute per-file
/// means for every score field present.
pub fn per_file_means(dir: impl AsRef<Path>) -> Result<Vec<FileMeans>, EvalError> {
    let mut results = Vec::new();

    for entry in WalkDir::new(dir.as_ref())
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }

        let records = match read_jsonl_values(entry.path()) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let mut means = BTreeMap::new();
        for metric in SCORE_FIELDS {
            let values = metric_values(&records, metric);
            if !values.is_empty() {
                means.insert(
                    metric.to_string(),
                    values.iter().sum::<f64>() / values.len() as f64,
                );
            }
        }

        if !means.is_empty() {
            results.push(FileMeans {
                path: entry.path().to_path_buf(),
                records: records.len(),
                means,
            });
        }
    }

    Ok(results)
}
