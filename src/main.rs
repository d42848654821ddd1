//! metarag - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use metarag::cleaning::Cleaner;
use metarag::cli::{Args, Commands, Verbosity};
use metarag::config::{EmbedderKind, MetaragConfig, StoreBackend};
use metarag::doctor::Doctor;
use metarag::pipeline::IngestionPipeline;
use metarag::planner::{QueryOutcome, QueryPlanner};
use metarag::providers::{EmbeddingProvider, HashingEmbedder, LocalEmbedder, OllamaClient, TextCompletionProvider};
use metarag::store::{IndexStatus, InMemoryVectorStore, QdrantGateway, VectorStoreGateway};
use metarag::types::{Document, Metadata};

fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("metarag={}", verbosity.log_directive())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn ollama_client(config: &MetaragConfig) -> Result<OllamaClient> {
    Ok(OllamaClient::with_timeout(
        &config.ollama_url(),
        &config.ollama.completion_model,
        &config.ollama.embedding_model,
        config.embedding.dimension,
        Duration::from_secs(config.ollama.timeout_secs),
    )?)
}

async fn build_embedder(config: &MetaragConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
        EmbedderKind::Ollama => Arc::new(ollama_client(config)?),
        EmbedderKind::Local => {
            let model = config.embedding.local_model.clone();
            let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::load(&model))
                .await
                .context("local model loader panicked")??;
            Arc::new(embedder)
        }
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.embedding.dimension)),
    };
    Ok(embedder)
}

fn build_store(config: &MetaragConfig) -> Result<Arc<dyn VectorStoreGateway>> {
    let store: Arc<dyn VectorStoreGateway> = match config.retrieval.backend {
        StoreBackend::Qdrant => Arc::new(QdrantGateway::connect(&config.qdrant.url)?),
        StoreBackend::Memory => {
            eprintln!(
                "{}",
                "Using the in-memory vector store; indexed data is discarded on exit.".yellow()
            );
            Arc::new(InMemoryVectorStore::new())
        }
    };
    Ok(store)
}

async fn build_pipeline(config: &MetaragConfig, clean: bool) -> Result<IngestionPipeline> {
    let embedder = build_embedder(config).await?;
    let store = build_store(config)?;
    let completion: Arc<dyn TextCompletionProvider> = Arc::new(ollama_client(config)?);

    let mut pipeline = IngestionPipeline::new(config.pipeline_config(), embedder, store)?
        .with_keyword_model(completion.clone());
    if clean || config.cleaning.enabled {
        pipeline = pipeline.with_cleaner(Cleaner::with_instructions(
            completion,
            config.cleaning.instructions.clone(),
        ));
    }
    Ok(pipeline)
}

async fn read_document(path: &Path, id: Option<&str>) -> Result<Document> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let source = path.display().to_string();
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), Value::from(source.clone()));
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        metadata.insert("file_name".to_string(), Value::from(name));
    }

    Ok(Document::with_id(id.unwrap_or(&source), text).with_metadata(metadata))
}

async fn run_init_index(config: &MetaragConfig) -> Result<()> {
    let pipeline = build_pipeline(config, false).await?;
    match pipeline.ensure_index().await? {
        IndexStatus::Created => println!(
            "{} index '{}' ({} dimensions)",
            "Created".green(),
            config.retrieval.index,
            config.retrieval.dimension
        ),
        IndexStatus::AlreadyExists => println!("Index '{}' already exists", config.retrieval.index),
    }
    Ok(())
}

async fn run_ingest(
    config: &MetaragConfig,
    files: &[std::path::PathBuf],
    clean: bool,
    id: Option<&str>,
    verbosity: Verbosity,
) -> Result<()> {
    let pipeline = build_pipeline(config, clean).await?;
    pipeline.ensure_index().await?;

    let pb = if verbosity.show_progress() {
        ProgressBar::new(files.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );

    let mut total_chunks = 0;
    let mut warnings = Vec::new();
    for path in files {
        pb.set_message(path.display().to_string());
        let document = read_document(path, id).await?;
        let report = pipeline
            .ingest(&document)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;

        total_chunks += report.chunks_indexed;
        warnings.extend(report.warnings);
        pb.inc(1);
    }
    pb.finish_and_clear();

    for warning in &warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }
    println!(
        "{} {} file(s), {} chunk(s) into '{}'",
        "Indexed".green().bold(),
        files.len(),
        total_chunks,
        config.retrieval.index
    );
    Ok(())
}

fn print_outcome(outcome: &QueryOutcome) {
    match &outcome.filter {
        Some(filter) => println!("{} {}", "Filter:".cyan().bold(), filter),
        None => println!("{} none", "Filter:".cyan().bold()),
    }

    println!("\n{}", "Passages".cyan().bold());
    if outcome.results.is_empty() {
        println!("  (no matching passages)");
    }
    for (i, result) in outcome.results.iter().enumerate() {
        let source = result
            .metadata
            .get("document_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let preview: String = result.text.chars().take(160).collect();
        println!("  {}. [{:.3}] {} {}", i + 1, result.score, source.dimmed(), preview.replace('\n', " "));
    }

    for warning in &outcome.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }

    if let Some(answer) = &outcome.answer {
        println!("\n{}\n{}", "Answer".green().bold(), answer);
    }
}

async fn run_query(
    config: &MetaragConfig,
    text: &str,
    top_k: Option<usize>,
    no_filter: bool,
    no_answer: bool,
    verbosity: Verbosity,
) -> Result<()> {
    let mut planner_config = config.planner_config();
    if let Some(k) = top_k {
        planner_config.top_k = k;
    }
    if no_filter {
        planner_config.enable_filter = false;
    }

    let embedder = build_embedder(config).await?;
    let store = build_store(config)?;
    let completion: Arc<dyn TextCompletionProvider> = Arc::new(ollama_client(config)?);
    let planner = QueryPlanner::new(planner_config, embedder, completion, store)?;

    let spinner = if verbosity.show_progress() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .context("invalid progress template")?,
    );
    spinner.set_message(if no_answer { "Searching..." } else { "Thinking..." });
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = planner.run(text, !no_answer).await;
    spinner.finish_and_clear();

    print_outcome(&outcome?);
    Ok(())
}

fn run_config(config: &MetaragConfig, explicit: Option<&Path>) -> Result<()> {
    let location = match explicit {
        Some(path) => path.display().to_string(),
        None => match MetaragConfig::default_path() {
            Some(path) if path.exists() => path.display().to_string(),
            _ => "built-in defaults".to_string(),
        },
    };
    println!("{} {}\n", "Configuration:".bold(), location);
    println!("{}", toml::to_string_pretty(config).context("Failed to render config")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(message) = args.validate() {
        eprintln!("{} {}", "error:".red().bold(), message);
        std::process::exit(2);
    }

    let verbosity = args.verbosity();
    init_logging(verbosity);

    let mut config = MetaragConfig::load(args.config.as_deref())?;
    if let Some(kind) = args.embedder {
        config.embedding.provider = kind;
    }

    match &args.command {
        Commands::InitIndex => run_init_index(&config).await?,
        Commands::Ingest { files, clean, id } => {
            run_ingest(&config, files, *clean, id.as_deref(), verbosity).await?
        }
        Commands::Query {
            text,
            top_k,
            no_filter,
            no_answer,
        } => run_query(&config, text, *top_k, *no_filter, *no_answer, verbosity).await?,
        Commands::Doctor => {
            let checks = Doctor::new(config.clone()).run_diagnostics().await;
            Doctor::display_results(&checks);
            if !Doctor::overall_status(&checks) {
                std::process::exit(1);
            }
        }
        Commands::Config => run_config(&config, args.config.as_deref())?,
    }

    Ok(())
}
