//! Dataset records and JSONL file handling.
//!
//! Every pipeline stage exchanges newline-delimited JSON. Generation records
//! carry the four-field transform contract; evaluation output adds score
//! fields on top of whatever the input record already held, so the generic
//! readers work on `serde_json::Value` maps and the typed reader is reserved
//! for stages that own their schema.

pub mod cleanse;
pub mod repair;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::DatasetError;
use crate::prompts::{Category, Emotion};

/// A validated transformation result.
///
/// Only constructed after a model reply passes schema validation; `content`
/// always holds the original source text, never the model's echo of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    /// Original caption text.
    pub content: String,
    /// Emotion the transformation was requested with.
    pub emotion: Emotion,
    /// Persona category the transformation was requested with.
    pub post_type: Category,
    /// Model-written pet-speak rendition.
    pub transformed_content: String,
}

/// Read a JSONL file into raw JSON objects.
///
/// Blank lines are skipped; a malformed line is a hard error carrying its
/// 1-based line number (use [`repair`] for corrupted files).
pub fn read_jsonl_values(path: impl AsRef<Path>) -> Result<Vec<serde_json::Value>, DatasetError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut values = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value =
            serde_json::from_str(trimmed).map_err(|e| DatasetError::MalformedLine {
                line: index + 1,
                message: e.to_string(),
            })?;
        values.push(value);
    }

    Ok(values)
}

/// Read a JSONL file into typed records.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, DatasetError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record =
            serde_json::from_str(trimmed).map_err(|e| DatasetError::MalformedLine {
                line: index + 1,
                message: e.to_string(),
            })?;
        records.push(record);
    }

    Ok(records)
}

/// Write records as one JSON object per line.
pub fn write_jsonl<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<(), DatasetError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(())
}

/// Pull the `content` string out of each record, skipping records without one.
pub fn extract_contents(values: &[serde_json::Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.get("content").and_then(|c| c.as_str()))
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .collect()
}
