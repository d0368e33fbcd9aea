//! CLI command definitions for petforge.
//!
//! One subcommand per pipeline stage: generate pet-speak datasets, prefilter
//! scraped corpora, evaluate transformed records, repair corrupted exports,
//! cleanse text fields and report/export scored data.

use anyhow::{bail, Context};
use clap::Parser;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::batch::{cartesian_work_list, sampled_work_list, BatchConfig, BatchDriver};
use crate::dataset::cleanse::clean_jsonl;
use crate::dataset::repair::repair_to_jsonl;
use crate::dataset::{extract_contents, read_jsonl_values, write_jsonl};
use crate::eval::{EvalRunner, EvalSelection, SCORE_FIELDS};
use crate::llm::{load_keys_from_env, ChatClient, EmbeddingClient, KeyPool};
use crate::prefilter::Prefilter;
use crate::report::{default_threshold, export_filtered, log_summary, per_file_means, summarize};
use crate::transform::Transformer;

/// Default chat model for generation and prefiltering.
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Pet-persona dataset forge for style-transfer fine-tuning.
#[derive(Parser)]
#[command(name = "petforge")]
#[command(about = "Generate, repair and evaluate cat/dog style-transfer datasets")]
#[command(version)]
#[command(
    long_about = "petforge drives an LLM to rewrite Korean social-media captions in cat/dog \
persona voices, with per-category emotion variants.\n\nRuns are checkpointed and resumable; \
transformed records are scored with a five-metric evaluator.\n\nExample usage:\n  \
petforge generate --input captions.jsonl --output dataset.jsonl --target-count 500"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Transform captions into persona/emotion variants.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Prefilter a scraped corpus down to usable source captions.
    Prefilter(PrefilterArgs),

    /// Score transformed records with the selected evaluators.
    Eval(EvalArgs),

    /// Recover records from a corrupted JSON export into JSONL.
    Repair(RepairArgs),

    /// Cleanse text fields across a JSONL dataset.
    Clean(CleanArgs),

    /// Summarize scored records and export the subset passing thresholds.
    Report(ReportArgs),
}

/// How the generate command builds its work list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SamplingMode {
    /// Every content x category x emotion combination.
    Cartesian,
    /// Weighted random pairs per content up to the target count.
    Weighted,
}

/// Arguments for `petforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Input JSONL file of caption records (reads the `content` field).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSONL file for transformed records.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Chat completions API base URL.
    #[arg(long, env = "PETFORGE_API_BASE")]
    pub api_base: String,

    /// Single API key; the PETFORGE_API_KEY* variables feed the key pool.
    #[arg(long, env = "PETFORGE_API_KEY")]
    pub api_key: Option<String>,

    /// Model to use for transformation.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Work-list construction mode.
    #[arg(long, value_enum, default_value = "cartesian")]
    pub sampling: SamplingMode,

    /// Stop once this many results are accumulated
    /// (required for weighted sampling).
    #[arg(long)]
    pub target_count: Option<usize>,

    /// Items per batch.
    #[arg(long, default_value = "10")]
    pub batch_size: usize,

    /// Seconds to sleep between batches.
    #[arg(long, default_value = "4")]
    pub sleep_time: u64,

    /// Save a checkpoint every N batches.
    #[arg(long, default_value = "10")]
    pub checkpoint_interval: usize,

    /// Per-key requests per minute for the key pool.
    #[arg(long, default_value = "15")]
    pub rate_limit: usize,
}

/// Arguments for `petforge prefilter`.
#[derive(Parser, Debug)]
pub struct PrefilterArgs {
    /// Input JSONL file of scraped caption records.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSONL file for suitable captions.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Chat completions API base URL.
    #[arg(long, env = "PETFORGE_API_BASE")]
    pub api_base: String,

    /// API key for the suitability checks.
    #[arg(long, env = "PETFORGE_API_KEY")]
    pub api_key: Option<String>,

    /// Model to use for suitability verdicts.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Number of suitable captions to collect.
    #[arg(short = 'n', long, default_value = "300")]
    pub num_samples: usize,

    /// Concurrent suitability checks.
    #[arg(long, default_value = "5")]
    pub max_workers: usize,

    /// Maximum caption length in characters.
    #[arg(long, default_value = "200")]
    pub max_length: usize,
}

/// Arguments for `petforge eval`.
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Input JSONL file of transformed records.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSONL file for scored records.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Run the embedding-based semantic similarity scorer.
    #[arg(long)]
    pub use_semantic: bool,

    /// Run the persona style-match scorer.
    #[arg(long)]
    pub use_style: bool,

    /// Run the composite quality scorer.
    #[arg(long)]
    pub use_quality: bool,

    /// Run the lexical-overlap scorer.
    #[arg(long)]
    pub use_bleu: bool,

    /// Run the fluency (perplexity) scorer.
    #[arg(long)]
    pub use_perplexity: bool,

    /// Run every scorer.
    #[arg(long)]
    pub all: bool,

    /// Embeddings API base URL (defaults to PETFORGE_API_BASE).
    #[arg(long, env = "PETFORGE_API_BASE")]
    pub api_base: Option<String>,

    /// API key for the embeddings endpoint.
    #[arg(long, env = "PETFORGE_API_KEY")]
    pub api_key: Option<String>,

    /// Embedding model for the semantic scorer.
    #[arg(long, default_value = "text-embedding-004")]
    pub embed_model: String,
}

/// Arguments for `petforge repair`.
#[derive(Parser, Debug)]
pub struct RepairArgs {
    /// Corrupted JSON export to recover.
    pub input: PathBuf,

    /// Output JSONL file for recovered records.
    pub output: PathBuf,
}

/// Arguments for `petforge clean`.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Input JSONL file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JSONL file for cleansed records.
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for `petforge report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Scored JSONL file, or a directory of them for per-file means.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Export records passing every metric threshold to this file.
    #[arg(short, long)]
    pub export: Option<PathBuf>,

    /// Metric thresholds as metric=value pairs
    /// (e.g. "type_score=0.8,bleu_score=0.4"). Unlisted metrics use their
    /// defaults when --export is given with no thresholds at all.
    #[arg(short, long)]
    pub thresholds: Option<String>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run an already-parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate(args).await,
        Commands::Prefilter(args) => run_prefilter(args).await,
        Commands::Eval(args) => run_eval(args).await,
        Commands::Repair(args) => run_repair(args),
        Commands::Clean(args) => run_clean(args),
        Commands::Report(args) => run_report(args),
    }
}

fn build_key_pool(single_key: Option<&str>, rate_limit: usize) -> Option<Arc<KeyPool>> {
    let mut keys = load_keys_from_env();
    if let Some(key) = single_key {
        if !keys.iter().any(|k| k == key) {
            keys.insert(0, key.to_string());
        }
    }
    if keys.len() < 2 {
        // A single credential needs no pool bookkeeping.
        return None;
    }
    info!(keys = keys.len(), rate_limit, "key pool initialized");
    Some(Arc::new(KeyPool::with_limit(keys, rate_limit)))
}

async fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let values = read_jsonl_values(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let contents = extract_contents(&values);
    if contents.is_empty() {
        bail!("no usable `content` records in {}", args.input.display());
    }
    info!(contents = contents.len(), "loaded source captions");

    let items = match args.sampling {
        SamplingMode::Cartesian => cartesian_work_list(&contents),
        SamplingMode::Weighted => {
            let target = args
                .target_count
                .context("--target-count is required with weighted sampling")?;
            let mut rng = rand::rngs::StdRng::from_entropy();
            sampled_work_list(&contents, target, &mut rng)
        }
    };
    info!(items = items.len(), "work list built");

    let client = Arc::new(ChatClient::new(
        args.api_base.clone(),
        args.api_key.clone(),
        args.model.clone(),
    ));

    let mut transformer = Transformer::new(client, args.model.clone());
    if let Some(pool) = build_key_pool(args.api_key.as_deref(), args.rate_limit) {
        transformer = transformer.with_key_pool(pool);
    }

    let config = BatchConfig {
        batch_size: args.batch_size,
        sleep_between_batches: Duration::from_secs(args.sleep_time),
        checkpoint_interval: args.checkpoint_interval,
        target_count: args.target_count,
    };

    let driver = BatchDriver::new(transformer, config);
    let outcome = driver.run(&items, &args.output).await?;

    info!(
        results = outcome.results.len(),
        failed = outcome.failed,
        processed = outcome.processed,
        output = %args.output.display(),
        "generation complete"
    );
    Ok(())
}

async fn run_prefilter(args: PrefilterArgs) -> anyhow::Result<()> {
    let values = read_jsonl_values(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let texts = extract_contents(&values);
    if texts.is_empty() {
        bail!("no usable `content` records in {}", args.input.display());
    }

    let client = Arc::new(ChatClient::new(
        args.api_base.clone(),
        args.api_key.clone(),
        args.model.clone(),
    ));

    let mut rules = crate::prefilter::PrefilterRules::default();
    rules.max_length = args.max_length;

    let prefilter = Prefilter::new(client, args.model.clone())
        .with_rules(rules)
        .with_max_workers(args.max_workers);

    let kept = prefilter.run(&texts, Some(args.num_samples)).await;

    let records: Vec<serde_json::Value> = kept
        .iter()
        .map(|content| serde_json::json!({ "content": content }))
        .collect();
    write_jsonl(&args.output, &records)?;

    info!(
        input = texts.len(),
        kept = kept.len(),
        output = %args.output.display(),
        "prefilter complete"
    );
    Ok(())
}

async fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    let selection = if args.all {
        EvalSelection::all()
    } else {
        EvalSelection {
            semantic: args.use_semantic,
            style: args.use_style,
            quality: args.use_quality,
            overlap: args.use_bleu,
            fluency: args.use_perplexity,
        }
    };
    if !selection.any() {
        bail!("no scorer selected; pass --all or one of the --use-* flags");
    }

    let embedder = if selection.semantic {
        let api_base = args
            .api_base
            .clone()
            .context("--api-base (or PETFORGE_API_BASE) is required for --use-semantic")?;
        Some(Arc::new(EmbeddingClient::new(
            api_base,
            args.api_key.clone(),
            args.embed_model.clone(),
        )) as Arc<dyn crate::llm::EmbeddingProvider>)
    } else {
        None
    };

    let mut records = read_jsonl_values(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(records = records.len(), "loaded records for evaluation");

    let runner = EvalRunner::new(selection, embedder);
    runner.evaluate(&mut records).await?;

    log_summary(&summarize(&records));
    write_jsonl(&args.output, &records)?;
    info!(output = %args.output.display(), "evaluation written");
    Ok(())
}

fn run_repair(args: RepairArgs) -> anyhow::Result<()> {
    let summary = repair_to_jsonl(&args.input, &args.output)
        .with_context(|| format!("repairing {}", args.input.display()))?;
    info!(
        recovered = summary.recovered,
        failed = summary.failed,
        written = summary.written,
        output = %args.output.display(),
        "repair complete"
    );
    Ok(())
}

fn run_clean(args: CleanArgs) -> anyhow::Result<()> {
    let summary = clean_jsonl(&args.input, &args.output)
        .with_context(|| format!("cleansing {}", args.input.display()))?;
    info!(
        read = summary.read,
        written = summary.written,
        output = %args.output.display(),
        "cleanse complete"
    );
    Ok(())
}

/// Parse "metric=value,metric=value" threshold overrides.
fn parse_thresholds(spec: &str) -> anyhow::Result<Vec<(String, f64)>> {
    let mut thresholds = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (metric, value) = part
            .split_once('=')
            .with_context(|| format!("bad threshold '{}', expected metric=value", part))?;
        let metric = metric.trim();
        if !SCORE_FIELDS.contains(&metric) {
            bail!(
                "unknown metric '{}'; known metrics: {}",
                metric,
                SCORE_FIELDS.join(", ")
            );
        }
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("bad threshold value in '{}'", part))?;
        thresholds.push((metric.to_string(), value));
    }
    Ok(thresholds)
}

fn run_report(args: ReportArgs) -> anyhow::Result<()> {
    if args.input.is_dir() {
        let files = per_file_means(&args.input)?;
        if files.is_empty() {
            bail!("no scored .jsonl files under {}", args.input.display());
        }
        for file in &files {
            info!(file = %file.path.display(), records = file.records, "per-file means");
            for (metric, mean) in &file.means {
                info!(metric = %metric, mean = format!("{:.3}", mean), "file metric mean");
            }
        }
        if args.export.is_some() {
            bail!("--export needs a single scored file as --input, not a directory");
        }
        return Ok(());
    }

    let records = read_jsonl_values(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let stats = summarize(&records);
    if stats.is_empty() {
        bail!("no score fields found in {}", args.input.display());
    }
    log_summary(&stats);

    if let Some(export_path) = args.export {
        let thresholds = match args.thresholds.as_deref() {
            Some(spec) => parse_thresholds(spec)?,
            // Default: every metric present in the file, at its default bar.
            None => stats
                .iter()
                .map(|s| (s.metric.clone(), default_threshold(&s.metric)))
                .collect(),
        };
        export_filtered(&args.input, &export_path, &thresholds)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thresholds() {
        let parsed = parse_thresholds("type_score=0.8, bleu_score=0.4").expect("parse");
        assert_eq!(
            parsed,
            vec![
                ("type_score".to_string(), 0.8),
                ("bleu_score".to_string(), 0.4)
            ]
        );
    }

    #[test]
    fn test_parse_thresholds_rejects_unknown_metric() {
        assert!(parse_thresholds("mystery_score=0.5").is_err());
        assert!(parse_thresholds("type_score:0.5").is_err());
        assert!(parse_thresholds("type_score=high").is_err());
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::parse_from([
            "petforge",
            "generate",
            "--input",
            "captions.jsonl",
            "--output",
            "out.jsonl",
            "--api-base",
            "http://localhost:4000",
            "--target-count",
            "100",
            "--sampling",
            "weighted",
        ]);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.target_count, Some(100));
                assert_eq!(args.sampling, SamplingMode::Weighted);
                assert_eq!(args.batch_size, 10);
                assert_eq!(args.rate_limit, 15);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_cli_parses_eval_flags() {
        let cli = Cli::parse_from([
            "petforge",
            "eval",
            "--input",
            "in.jsonl",
            "--output",
            "out.jsonl",
            "--use-style",
            "--use-quality",
        ]);
        match cli.command {
            Commands::Eval(args) => {
                assert!(args.use_style);
                assert!(args.use_quality);
                assert!(!args.use_semantic);
                assert!(!args.all);
            }
            _ => panic!("expected eval"),
        }
    }

    #[test]
    fn test_cli_parses_repair_positionals() {
        let cli = Cli::parse_from(["petforge", "repair", "broken.json", "fixed.jsonl"]);
        match cli.command {
            Commands::Repair(args) => {
                assert_eq!(args.input, PathBuf::from("broken.json"));
                assert_eq!(args.output, PathBuf::from("fixed.jsonl"));
            }
            _ => panic!("expected repair"),
        }
    }
}
