//! Command-line front end for the docrag pipeline.
//!
//! Exposes exactly the pipeline's entry points: `build`, `status`
//! (load), `clear`, and `query` (retrieve, or retrieve + generate).
//! Credentials are read from the environment here, at the edge, and
//! passed into the library as constructor arguments.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use docrag::{
    GeminiEmbedder, GeminiModel, IndexManager, MarkdownParser, RagConfig, RagError, RagPipeline,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docrag", version, about = "Ask questions about your documents")]
struct Cli {
    /// Directory documents are ingested from
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory the index is persisted under
    #[arg(long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Number of chunks to retrieve per query
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse the data directory and build a fresh index, replacing any
    /// existing one
    Build,
    /// Show the persisted index status
    Status,
    /// Delete all persisted index state
    Clear,
    /// Ask a question against the persisted index
    Query {
        /// The question to ask
        question: String,
        /// Print the retrieved chunks without generating an answer
        #[arg(long)]
        retrieve_only: bool,
    },
}

fn build_pipeline(config: &RagConfig) -> anyhow::Result<RagPipeline> {
    let api_key = std::env::var("GOOGLE_API_KEY")
        .context("GOOGLE_API_KEY is not set (put it in the environment or a .env file)")?;

    let embedder = GeminiEmbedder::new(api_key.clone())?;
    let model = GeminiModel::new(api_key)?;

    Ok(RagPipeline::builder()
        .config(config.clone())
        .parser(Arc::new(MarkdownParser::new(config.chunk_size, config.chunk_overlap)))
        .embedder(Arc::new(embedder))
        .model(Arc::new(model))
        .build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = RagConfig::builder()
        .data_dir(&cli.data_dir)
        .storage_dir(&cli.storage_dir)
        .top_k(cli.top_k)
        .build()?;

    match cli.command {
        Command::Build => {
            let pipeline = build_pipeline(&config)?;
            let report = pipeline.ingest_and_build().await?;
            println!(
                "Indexed {} documents ({} chunks).",
                report.documents,
                report.chunks.len()
            );
            for failure in &report.failures {
                eprintln!("skipped {}: {}", failure.source, failure.error);
            }
        }
        Command::Status => {
            // Load validates the persisted artifacts without touching any
            // remote backend, so no credentials are needed here.
            let embedder = Arc::new(docrag::HashEmbedder::new(1));
            match IndexManager::new(&config, embedder).load().await {
                Ok(index) => {
                    let manifest = index.manifest();
                    println!(
                        "Index at {}: {} chunks, model {} ({} dims), built {}",
                        config.storage_dir.display(),
                        manifest.chunk_count,
                        manifest.model_id,
                        manifest.dimensions,
                        manifest.built_at
                    );
                }
                Err(RagError::IndexNotFound { .. }) => {
                    println!("No index at {}. Run `docrag build`.", config.storage_dir.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Clear => {
            let embedder = Arc::new(docrag::HashEmbedder::new(1));
            IndexManager::new(&config, embedder).clear().await?;
            println!("Cleared index at {}.", config.storage_dir.display());
        }
        Command::Query { question, retrieve_only } => {
            let pipeline = build_pipeline(&config)?;
            match pipeline.load().await {
                Ok(()) => {}
                Err(RagError::IndexNotFound { .. }) => {
                    bail!("no index found; run `docrag build` first")
                }
                Err(e) => return Err(e.into()),
            }
            info!(top_k = config.top_k, "index loaded");

            if retrieve_only {
                let retrieved = pipeline.retrieve(&question, config.top_k).await?;
                for result in &retrieved.results {
                    println!(
                        "{:.4}  [{} #{}] {}",
                        result.score,
                        result.chunk.document_id,
                        result.chunk.ordinal,
                        result.chunk.text
                    );
                }
            } else {
                let answer = pipeline.query(&question).await?;
                println!("{}", answer.text);
                if answer.truncated {
                    eprintln!("(some low-scored sources were dropped to fit the context window)");
                }
                println!("\nSources:");
                for result in &answer.sources.results {
                    let source = result
                        .chunk
                        .metadata
                        .get("source")
                        .cloned()
                        .unwrap_or_else(|| result.chunk.document_id.clone());
                    println!("  {:.4}  {} #{}", result.score, source, result.chunk.ordinal);
                }
            }
        }
    }

    Ok(())
}
