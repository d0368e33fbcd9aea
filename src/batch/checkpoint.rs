//! Batch run checkpoints.
//!
//! A checkpoint is the accumulated results plus the count of work items
//! consumed, written periodically during a run. A leftover checkpoint file
//! IS the crash-recovery mechanism: nothing deletes it on failure, and a
//! restarted run resumes by skipping the consumed prefix. Items consumed
//! before the last save are never reprocessed, so their failures are
//! permanent for that run (at-least-once semantics).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::dataset::TransformRecord;
use crate::error::BatchError;

/// Persisted partial progress of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Successfully accumulated results so far.
    pub results: Vec<TransformRecord>,
    /// Number of work items consumed (successes and failures both count).
    pub processed_count: usize,
    /// Identifier of the run that first created this checkpoint.
    #[serde(default)]
    pub run_id: Option<Uuid>,
    /// When this checkpoint was written.
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Fresh checkpoint for a new run.
    pub fn new(run_id: Uuid) -> Self {
        Self {
            results: Vec::new(),
            processed_count: 0,
            run_id: Some(run_id),
            saved_at: None,
        }
    }

    /// Checkpoint path derived from the output file:
    /// `checkpoint_<file-name>` in the same directory.
    pub fn path_for(output: &Path) -> PathBuf {
        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        output.with_file_name(format!("checkpoint_{}", file_name))
    }

    /// Load a checkpoint if one exists.
    ///
    /// A missing file is a clean start (`None`); an unreadable file is an
    /// error so a run never silently restarts from zero over saved progress.
    pub fn load(path: &Path) -> Result<Option<Self>, BatchError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let checkpoint =
            serde_json::from_str(&content).map_err(|e| BatchError::CorruptCheckpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(checkpoint))
    }

    /// Write this checkpoint, stamping `saved_at`.
    pub fn save(&mut self, path: &Path) -> Result<(), BatchError> {
        self.saved_at = Some(Utc::now());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        tracing::info!(
            path = %path.display(),
            results = self.results.len(),
            processed = self.processed_count,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint file. Missing file is fine.
    pub fn remove(path: &Path) -> Result<(), BatchError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "checkpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BatchError::Io(e)),
        }
    }
}
