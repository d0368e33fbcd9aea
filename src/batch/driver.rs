//! Batch driver: sequential transforms with pacing, checkpoints and resume.
//!
//! Items are processed in order, one at a time, with a fixed sleep between
//! batches to spread load. Every `checkpoint_interval` batches the
//! accumulated state is persisted; a restarted run skips the consumed prefix
//! and keeps accumulating toward the target. The checkpoint is removed only
//! when a run completes (target reached or input exhausted).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::checkpoint::Checkpoint;
use super::{WorkDistribution, WorkItem};
use crate::dataset::{write_jsonl, TransformRecord};
use crate::error::BatchError;
use crate::transform::{Sleeper, TokioSleeper, Transformer};

/// Tuning knobs for a batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items per batch.
    pub batch_size: usize,
    /// Sleep between batches.
    pub sleep_between_batches: Duration,
    /// Save a checkpoint every N batches.
    pub checkpoint_interval: usize,
    /// Stop early once this many results are accumulated.
    pub target_count: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            sleep_between_batches: Duration::from_secs(4),
            checkpoint_interval: 10,
            target_count: None,
        }
    }
}

/// Final tally of a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Accumulated results (trimmed to the target count, if set).
    pub results: Vec<TransformRecord>,
    /// Items that exhausted their retry budget.
    pub failed: usize,
    /// Work items consumed across the whole run, resumed prefix included.
    pub processed: usize,
    /// Items skipped because a checkpoint covered them.
    pub resumed_from: usize,
}

/// Drives a work list through the transformer.
pub struct BatchDriver {
    transformer: Transformer,
    config: BatchConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchDriver {
    /// Create a driver with real pacing sleeps.
    pub fn new(transformer: Transformer, config: BatchConfig) -> Self {
        Self {
            transformer,
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Override the pacing sleeper (tests inject a no-op).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn target_reached(&self, results: &[TransformRecord]) -> bool {
        self.config
            .target_count
            .map(|target| results.len() >= target)
            .unwrap_or(false)
    }

    /// Run the work list, writing results to `output` and checkpointing to
    /// the derived checkpoint path.
    pub async fn run(
        &self,
        items: &[WorkItem],
        output: &Path,
    ) -> Result<BatchOutcome, BatchError> {
        let checkpoint_path = Checkpoint::path_for(output);

        let mut checkpoint = match Checkpoint::load(&checkpoint_path)? {
            Some(existing) => {
                tracing::info!(
                    results = existing.results.len(),
                    processed = existing.processed_count,
                    "resuming from checkpoint"
                );
                existing
            }
            None => Checkpoint::new(Uuid::new_v4()),
        };

        let resumed_from = checkpoint.processed_count;
        let mut failed = 0usize;

        let remaining: &[WorkItem] = if resumed_from < items.len() {
            &items[resumed_from..]
        } else {
            &[]
        };

        let dist = WorkDistribution::tally(remaining.iter().map(|i| (i.post_type, i.emotion)));
        tracing::info!(run_id = ?checkpoint.run_id, "work list distribution:\n{}", dist);

        let total_batches = remaining.len().div_ceil(self.config.batch_size.max(1));

        'batches: for (batch_index, batch) in
            remaining.chunks(self.config.batch_size.max(1)).enumerate()
        {
            if self.target_reached(&checkpoint.results) {
                break;
            }

            tracing::info!(
                batch = batch_index + 1,
                total_batches,
                items = batch.len(),
                "processing batch"
            );

            for item in batch {
                match self
                    .transformer
                    .transform(&item.content, item.post_type, item.emotion)
                    .await
                {
                    Ok(record) => checkpoint.results.push(record),
                    Err(failure) => {
                        failed += 1;
                        tracing::warn!(
                            category = %item.post_type,
                            emotion = %item.emotion,
                            attempts = failure.attempts,
                            error = %failure.error,
                            "item dropped"
                        );
                    }
                }
                checkpoint.processed_count += 1;

                if self.target_reached(&checkpoint.results) {
                    break 'batches;
                }
            }

            let accumulated = checkpoint.results.len();
            tracing::info!(
                batch = batch_index + 1,
                accumulated,
                failed,
                "batch complete"
            );

            if (batch_index + 1) % self.config.checkpoint_interval.max(1) == 0 {
                checkpoint.save(&checkpoint_path)?;
            }

            if batch_index + 1 < total_batches {
                self.sleeper.sleep(self.config.sleep_between_batches).await;
            }
        }

        let mut results = checkpoint.results;
        if let Some(target) = self.config.target_count {
            results.truncate(target);
        }

        write_jsonl(output, &results)?;
        Checkpoint::remove(&checkpoint_path)?;

        let final_dist =
            WorkDistribution::tally(results.iter().map(|r| (r.post_type, r.emotion)));
        tracing::info!(
            results = results.len(),
            failed,
            processed = checkpoint.processed_count,
            "run complete; result distribution:\n{}",
            final_dist
        );

        Ok(BatchOutcome {
            results,
            failed,
            processed: checkpoint.processed_count,
            resumed_from,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use crate::prompts::{Category, Emotion};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Provider that answers every request with a well-formed echo of the
    /// requested pair, and can be told to fail specific call numbers.
    struct EchoProvider {
        calls: AtomicUsize,
        fail_calls: Vec<usize>,
    }

    impl EchoProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_calls: Vec::new(),
            })
        }

        fn failing_on(fail_calls: Vec<usize>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_calls,
            })
        }
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_calls.contains(&call) {
                return Err(LlmError::RequestFailed("scripted failure".to_string()));
            }

            // Recover the requested pair from the prompt's JSON contract.
            let prompt = &request.messages[0].content;
            let category = if prompt.contains("\"post_type\": \"cat\"") {
                "cat"
            } else {
                "dog"
            };
            let emotion = ["happy", "normal", "grumpy", "angry", "curious", "sad"]
                .iter()
                .find(|e| prompt.contains(&format!("\"emotion\": \"{}\"", e)))
                .expect("prompt embeds an emotion");

            let reply = serde_json::json!({
                "content": "echo",
                "emotion": emotion,
                "post_type": category,
                "transformed_content": format!("변환됨 {}/{}", category, emotion),
            })
            .to_string();

            Ok(GenerationResponse {
                id: "r".to_string(),
                model: "gemini-2.0-flash".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(reply),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    total_tokens: 2,
                },
            })
        }
    }

    struct NoopSleeper;

    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem {
                content: format!("원문 {}", i),
                post_type: if i % 2 == 0 { Category::Cat } else { Category::Dog },
                emotion: Emotion::all()[i % Emotion::all().len()],
            })
            .collect()
    }

    fn driver(provider: Arc<EchoProvider>, config: BatchConfig) -> BatchDriver {
        let transformer = Transformer::new(provider, "gemini-2.0-flash")
            .with_sleeper(Arc::new(NoopSleeper));
        BatchDriver::new(transformer, config).with_sleeper(Arc::new(NoopSleeper))
    }

    #[tokio::test]
    async fn test_full_run_processes_everything() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.jsonl");

        let d = driver(EchoProvider::new(), BatchConfig::default());
        let outcome = d.run(&items(7), &output).await.expect("run");

        assert_eq!(outcome.results.len(), 7);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.processed, 7);
        assert_eq!(outcome.resumed_from, 0);
        assert!(output.exists());
        // Checkpoint is gone after a completed run.
        assert!(!Checkpoint::path_for(&output).exists());
    }

    #[tokio::test]
    async fn test_target_count_stops_early() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.jsonl");

        let config = BatchConfig {
            target_count: Some(3),
            ..BatchConfig::default()
        };
        let d = driver(EchoProvider::new(), config);
        let outcome = d.run(&items(20), &output).await.expect("run");

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.processed, 3);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.jsonl");

        // Fail calls 1-3: the first item burns its whole retry budget.
        let provider = EchoProvider::failing_on(vec![1, 2, 3]);
        let d = driver(provider, BatchConfig::default());
        let outcome = d.run(&items(4), &output).await.expect("run");

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.processed, 4);
    }

    #[tokio::test]
    async fn test_resume_skips_processed_items() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.jsonl");
        let checkpoint_path = Checkpoint::path_for(&output);

        // Simulate a crashed run that had consumed 5 items, keeping 4.
        let mut stale = Checkpoint::new(Uuid::new_v4());
        stale.processed_count = 5;
        stale.results = (0..4)
            .map(|i| TransformRecord {
                content: format!("이전 {}", i),
                emotion: Emotion::Normal,
                post_type: Category::Cat,
                transformed_content: format!("이전 변환 {}", i),
            })
            .collect();
        stale.save(&checkpoint_path).expect("save stale");

        let provider = EchoProvider::new();
        let d = driver(Arc::clone(&provider), BatchConfig::default());
        let outcome = d.run(&items(8), &output).await.expect("run");

        assert_eq!(outcome.resumed_from, 5);
        // 4 carried over + 3 fresh (items 5..8).
        assert_eq!(outcome.results.len(), 7);
        assert_eq!(outcome.processed, 8);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(!checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_checkpoint_written_at_interval() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.jsonl");
        let checkpoint_path = Checkpoint::path_for(&output);

        // batch_size 1 + interval 2: checkpoint after every 2nd batch. The
        // run finishes and removes it, so verify via a fresh partial run
        // against a provider that dies after 2 items' worth of calls.
        let config = BatchConfig {
            batch_size: 1,
            checkpoint_interval: 2,
            ..BatchConfig::default()
        };

        // All calls from item 3 on fail: items 3..6 each burn 3 attempts.
        let provider = EchoProvider::failing_on((3..100).collect());
        let d = driver(provider, config);
        let outcome = d.run(&items(6), &output).await.expect("run");

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.failed, 4);
        // Run completed (input exhausted), so no checkpoint remains.
        assert!(!checkpoint_path.exists());
    }
}
