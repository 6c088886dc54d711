//! Quiver CLI - Command-line interface
//!
//! Usage:
//!   quiver ingest <path> [--title <title>]
//!   quiver query <question> [--top-k <n>]
//!   quiver repair <manifest.json>
//!   quiver inspect <id>...

use clap::{Parser, Subcommand};
use quiver_core::{AppConfig, Document, Result};
use quiver_embed::{create_embedder, Embedder};
use quiver_extract::create_extractor;
use quiver_index::{MemoryIndex, PineconeIndex, VectorIndex};
use quiver_pipeline::{Pipeline, RepairPair};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quiver")]
#[command(about = "Proposition-level ingestion and retrieval over a hosted vector index")]
#[command(version)]
struct Cli {
    /// Run against the in-memory index with rule-based extraction
    /// (no credentials, state lives only for this invocation)
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a text document into the index
    Ingest {
        /// Path to a plain-text document
        path: String,

        /// Document title; defaults to the file name
        #[arg(long)]
        title: Option<String>,
    },
    /// Query the index with a natural-language question
    Query {
        question: String,

        /// Number of matches to return
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Restore metadata from a JSON manifest of {id, content} pairs
    Repair {
        /// Path to the manifest file
        manifest: String,
    },
    /// Show stored state (metadata presence, vector length) for ids
    Inspect {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Fail fast on missing configuration, before tracing or any network
    // call; the error names the missing variable.
    let config = if cli.offline {
        AppConfig::offline()
    } else {
        match AppConfig::from_env() {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(2);
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone())),
        )
        .init();

    if let Err(err) = run(cli, config).await {
        tracing::error!(error = %err, hint = err.remediation(), "operation failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let extractor = create_extractor(&config.extractor)?;

    let index: Arc<dyn VectorIndex> = if cli.offline {
        Arc::new(MemoryIndex::new(embedder.dimension()))
    } else {
        let index = PineconeIndex::from_config(&config.index)?;
        index.check_dimension().await?;
        Arc::new(index)
    };

    let pipeline = Pipeline::new(
        embedder,
        Arc::clone(&index),
        extractor,
        config.index.namespace.clone(),
    )?
    .with_batch_size(config.index.batch_size);

    match cli.command {
        Commands::Ingest { path, title } => {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                quiver_core::QuiverError::Config(format!("cannot read {path}: {e}"))
            })?;
            let title = title.unwrap_or_else(|| path.clone());
            let document = Document::new(title, text);

            let report = pipeline.ingest(&document).await?;

            println!(
                "Ingested {} propositions from {} paragraphs ({} written).",
                report.propositions, report.paragraphs, report.upsert.written
            );
            if !report.upsert.is_complete() {
                println!(
                    "WARNING: partial ingestion: {} records not written; committed batches: {:?}. Re-run to retry.",
                    report.upsert.failed,
                    report.upsert.committed_batches()
                );
            }
        }
        Commands::Query { question, top_k } => {
            let matches = pipeline.query(&question, top_k).await?;

            if matches.is_empty() {
                println!("No matches.");
            }
            for (rank, m) in matches.iter().enumerate() {
                println!("{}. [{:.4}] {}  ({})", rank + 1, m.score, m.display_text, m.id);
            }
        }
        Commands::Repair { manifest } => {
            let raw = std::fs::read_to_string(&manifest).map_err(|e| {
                quiver_core::QuiverError::Config(format!("cannot read {manifest}: {e}"))
            })?;
            let pairs: Vec<RepairPair> = serde_json::from_str(&raw).map_err(|e| {
                quiver_core::QuiverError::Config(format!("invalid manifest {manifest}: {e}"))
            })?;

            let report = pipeline.repair().run(&pairs).await?;

            println!(
                "Repaired {} records: {} reused stored values, {} freshly embedded, {} written.",
                report.total, report.reused, report.reembedded, report.upsert.written
            );
        }
        Commands::Inspect { ids } => {
            let found = index.fetch(&ids, config.index.namespace.as_deref()).await?;

            for id in &ids {
                match found.get(id) {
                    Some(record) => {
                        println!("{id}:");
                        println!("  has_metadata: {}", record.has_metadata());
                        println!("  values_length: {}", record.values.len());
                        if let Some(metadata) = &record.metadata {
                            println!(
                                "  metadata: {}",
                                serde_json::to_string(metadata).unwrap_or_default()
                            );
                        }
                    }
                    None => println!("{id}: not found"),
                }
            }
        }
    }

    Ok(())
}
