mod logging;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_core::bootstrap::{build_embedder, build_generator};
use docqa_core::channel::CliChannel;
use docqa_core::chat::{format_answer, run_chat};
use docqa_core::config::Config;
use docqa_core::pipeline::{IndexOutcome, IndexStatus, Pipeline};
use docqa_llm::any::{AnyEmbedder, AnyGenerator};

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Ask questions about a single document using a local vector index and a local LLM"
)]
struct Cli {
    /// Config file (default: $DOCQA_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document to index, overriding `document.path`
    #[arg(long, global = true)]
    document: Option<PathBuf>,

    /// Rebuild the index even if the document is unchanged
    #[arg(long, global = true, default_value_t = false)]
    rebuild: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Interactive question loop (default)
    Chat,
    /// Answer one question and exit
    Ask { question: String },
    /// Build or refresh the index and exit
    Index,
    /// Show document, checkpoint, and index state
    Status,
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("DOCQA_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let _telemetry = logging::init(&Config::default());
            let e = anyhow::Error::new(e)
                .context(format!("loading config from {}", config_path.display()));
            tracing::error!("fatal: {e:#}");
            return Err(e);
        }
    };
    if let Some(document) = cli.document {
        config.document.path = document;
    }

    let _telemetry = logging::init(&config);
    for warning in std::mem::take(&mut config.warnings) {
        tracing::warn!("{warning}");
    }
    if let Err(e) = config.validate() {
        tracing::error!("fatal: {e}");
        return Err(e.into());
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        document = %config.document.path.display(),
        "docqa starting"
    );

    let command = cli.command.unwrap_or(Command::Chat);
    let result = start(config, command, cli.rebuild).await;
    if let Err(e) = &result {
        tracing::error!("fatal: {e:#}");
    }
    result
}

async fn start(config: Config, command: Command, rebuild: bool) -> anyhow::Result<()> {
    let embedder = build_embedder(&config)
        .await
        .context("initializing the embedding backend")?;
    let generator = build_generator(&config).context("initializing the generator")?;
    let pipeline = Pipeline::new(config, embedder, generator);
    run(&pipeline, command, rebuild).await
}

async fn run(
    pipeline: &Pipeline<AnyEmbedder, AnyGenerator>,
    command: Command,
    rebuild: bool,
) -> anyhow::Result<()> {
    if command == Command::Status {
        print_status(&pipeline.status().await?);
        return Ok(());
    }

    let outcome = pipeline
        .ensure_index(rebuild)
        .await
        .context("preparing the document index")?;
    report_outcome(&outcome);

    match command {
        Command::Index | Command::Status => Ok(()),
        Command::Ask { question } => {
            preflight(pipeline.generator()).await;
            let answer = pipeline
                .answer(&question)
                .await
                .map_err(|e| {
                    let message = e.user_message();
                    anyhow::Error::new(e).context(message)
                })?;
            print!("{}", format_answer(&answer));
            Ok(())
        }
        Command::Chat => {
            preflight(pipeline.generator()).await;
            let mut channel = CliChannel::stdio();
            tokio::select! {
                stats = run_chat(pipeline, &mut channel) => {
                    stats?;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\nGoodbye!");
                    tracing::info!("interrupted");
                }
            }
            Ok(())
        }
    }
}

/// Warn about an unreachable runtime or missing model without aborting.
async fn preflight(generator: &AnyGenerator) {
    if let Err(e) = generator.preflight().await {
        tracing::warn!("generator preflight failed: {e}");
        eprintln!("Warning: {e}");
    }
}

fn report_outcome(outcome: &IndexOutcome) {
    match outcome {
        IndexOutcome::Reused { chunks } => {
            println!("Document unchanged, using existing index ({chunks} chunks).");
        }
        IndexOutcome::Built {
            pages,
            chunks,
            stats,
        } => println!(
            "Indexed {pages} pages into {chunks} chunks (dimension {}) in {} ms.",
            stats.dimension, stats.elapsed_ms
        ),
        IndexOutcome::Stale { reason, chunks } => {
            println!("Warning: {reason}. Serving the previous index ({chunks} chunks).");
        }
    }
}

fn print_status(status: &IndexStatus) {
    println!("Document:   {}", status.document.display());
    println!(
        "Present:    {}",
        if status.document_present { "yes" } else { "no" }
    );
    match &status.checkpoint {
        Some(cp) => println!(
            "Checkpoint: {} pages, {} chunks, model {}, size {}/{} (indexed {})",
            cp.page_count,
            cp.chunk_count,
            cp.settings.embedding_model,
            cp.settings.chunk_size,
            cp.settings.chunk_overlap,
            cp.indexed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        ),
        None => println!("Checkpoint: none"),
    }
    match &status.metadata {
        Some(meta) => println!(
            "Index:      {} chunks, dimension {}, model {}",
            meta.chunk_count, meta.dimension, meta.embedding_model
        ),
        None => println!("Index:      not built"),
    }
    println!(
        "Up to date: {}",
        if status.up_to_date { "yes" } else { "no" }
    );
}
