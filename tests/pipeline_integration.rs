//! End-to-end pipeline integration tests.
//!
//! Drives generate -> evaluate -> report through the library API against a
//! mock provider, plus a live-API smoke test that only runs when ignored
//! tests are requested with credentials present.
//!
//! Run the live test with:
//! PETFORGE_API_BASE=... PETFORGE_API_KEY=... cargo test --test pipeline_integration -- --ignored

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use petforge::batch::{cartesian_work_list, BatchConfig, BatchDriver, Checkpoint};
use petforge::dataset::read_jsonl_values;
use petforge::error::LlmError;
use petforge::eval::{EvalRunner, EvalSelection, QUALITY_FIELD, STYLE_FIELD};
use petforge::llm::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};
use petforge::report::{export_filtered, summarize};
use petforge::transform::{Sleeper, Transformer};

/// Provider that produces a plausible pet-speak reply for any request.
struct PersonaEchoProvider;

#[async_trait]
impl LlmProvider for PersonaEchoProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
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

        let transformed = match category {
            "cat" => "오늘도 창가에서 뒹굴었다냥 🐱",
            _ => "오늘도 신나게 산책했다멍 🐶",
        };

        let reply = serde_json::json!({
            "content": "무시되는 원문 echo",
            "emotion": emotion,
            "post_type": category,
            "transformed_content": transformed,
        })
        .to_string();

        Ok(GenerationResponse {
            id: "mock".to_string(),
            model: "gemini-2.0-flash".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(reply),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage {
                prompt_tokens: 200,
                completion_tokens: 40,
                total_tokens: 240,
            },
        })
    }
}

struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[tokio::test]
async fn test_generate_then_evaluate_then_export() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset_path = dir.path().join("dataset.jsonl");
    let scored_path = dir.path().join("scored.jsonl");
    let filtered_path = dir.path().join("filtered.jsonl");

    // Generate: 2 contents x 2 categories x 6 emotions.
    let contents = vec![
        "오늘 공원에서 산책을 했다".to_string(),
        "창가에서 낮잠을 잤다".to_string(),
    ];
    let items = cartesian_work_list(&contents);
    assert_eq!(items.len(), 24);

    let transformer = Transformer::new(Arc::new(PersonaEchoProvider), "gemini-2.0-flash")
        .with_sleeper(Arc::new(NoopSleeper));
    let driver = BatchDriver::new(transformer, BatchConfig::default())
        .with_sleeper(Arc::new(NoopSleeper));

    let outcome = driver.run(&items, &dataset_path).await.expect("generate");
    assert_eq!(outcome.results.len(), 24);
    assert_eq!(outcome.failed, 0);
    // Source text is preserved verbatim despite the mangled echo.
    assert!(outcome
        .results
        .iter()
        .all(|r| r.content == "오늘 공원에서 산책을 했다" || r.content == "창가에서 낮잠을 잤다"));
    assert!(!Checkpoint::path_for(&dataset_path).exists());

    // Evaluate with the local scorers.
    let mut records = read_jsonl_values(&dataset_path).expect("read dataset");
    assert_eq!(records.len(), 24);

    let selection = EvalSelection {
        style: true,
        quality: true,
        overlap: true,
        fluency: true,
        ..EvalSelection::default()
    };
    EvalRunner::new(selection, None)
        .evaluate(&mut records)
        .await
        .expect("evaluate");

    // Persona echo always carries the requested persona's endings.
    assert!(records.iter().all(|r| r[STYLE_FIELD] == 1.0));
    assert!(records
        .iter()
        .all(|r| r[QUALITY_FIELD].as_f64().expect("quality") > 0.5));

    petforge::dataset::write_jsonl(&scored_path, &records).expect("write scored");

    // Report + threshold export.
    let stats = summarize(&records);
    let style_stat = stats
        .iter()
        .find(|s| s.metric == STYLE_FIELD)
        .expect("style stat");
    assert_eq!(style_stat.count, 24);
    assert_eq!(style_stat.below_threshold, 0);

    let (read, kept) = export_filtered(
        &scored_path,
        &filtered_path,
        &[(STYLE_FIELD.to_string(), 0.8), (QUALITY_FIELD.to_string(), 0.5)],
    )
    .expect("export");
    assert_eq!(read, 24);
    assert_eq!(kept, 24);
    assert!(filtered_path.exists());
}

#[tokio::test]
async fn test_resume_continues_from_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset_path = dir.path().join("dataset.jsonl");

    let contents = vec!["오늘 공원에서 산책을 했다".to_string()];
    let items = cartesian_work_list(&contents);

    // Seed a checkpoint as if a previous run consumed half the items.
    let mut stale = Checkpoint::new(uuid::Uuid::new_v4());
    stale.processed_count = 6;
    stale
        .save(&Checkpoint::path_for(&dataset_path))
        .expect("save checkpoint");

    let transformer = Transformer::new(Arc::new(PersonaEchoProvider), "gemini-2.0-flash")
        .with_sleeper(Arc::new(NoopSleeper));
    let driver = BatchDriver::new(transformer, BatchConfig::default())
        .with_sleeper(Arc::new(NoopSleeper));

    let outcome = driver.run(&items, &dataset_path).await.expect("resume run");
    assert_eq!(outcome.resumed_from, 6);
    // 12 items total, 6 skipped, 6 fresh results (stale run kept none).
    assert_eq!(outcome.results.len(), 6);
    assert_eq!(outcome.processed, 12);
}

fn live_client() -> Option<ChatClient> {
    ChatClient::from_env().ok()
}

#[tokio::test]
#[ignore] // Needs PETFORGE_API_BASE / PETFORGE_API_KEY and network access.
async fn test_live_transform_smoke() {
    let client = match live_client() {
        Some(client) => Arc::new(client),
        None => panic!("PETFORGE_API_BASE must be set for live tests"),
    };

    let transformer = Transformer::new(client, "gemini-2.0-flash");
    let record = transformer
        .transform(
            "오늘 공원에서 산책을 했다",
            petforge::prompts::Category::Cat,
            petforge::prompts::Emotion::Happy,
        )
        .await
        .expect("live transform should succeed");

    assert_eq!(record.content, "오늘 공원에서 산책을 했다");
    assert!(!record.transformed_content.is_empty());
}
