//! `docent` command line: ask questions about a project's documents and manage
//! its retrieval index.
//!
//! ```bash
//! docent --config config/docent.toml build handbook
//! docent ask handbook "How do I request time off?"
//! docent compare handbook "leave policy" --k 5 --semantic 0.7 --keyword 0.3
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use docent_core::Config;
use docent_core::bootstrap::{build_service, create_provider, health_check, resolve_config_path};
use docent_index::{DocumentStore, FsDocumentStore, Weights};
use serde_json::json;

#[derive(Parser)]
#[command(name = "docent", version, about = "Grounded question answering over project documents")]
struct Cli {
    /// Configuration file (TOML). Defaults to `DOCENT_CONFIG` or `config/docent.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question using the project's documents, building the index first if needed.
    Ask { project: String, question: String },
    /// Show hybrid and semantic-only results for the same query.
    Compare {
        project: String,
        query: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
        /// Weight of the semantic signal. Defaults to `retrieval.semantic_weight`.
        #[arg(long)]
        semantic: Option<f32>,
        /// Weight of the keyword signal. Defaults to `retrieval.keyword_weight`.
        #[arg(long)]
        keyword: Option<f32>,
    },
    /// Build the project's index unless one is already loaded.
    Build { project: String },
    /// Delete and rebuild the project's index.
    Regenerate { project: String },
    /// Check the persisted index without modifying it.
    Validate { project: String },
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let store: Arc<dyn DocumentStore> = Arc::new(FsDocumentStore::new(&config.documents.root));
    // One-shot process: a detached build would be cancelled when `main` returns.
    let service = build_service(&config, store)?.with_auto_build(false);

    match cli.command {
        Command::Ask { project, question } => {
            health_check(&create_provider(&config, None)?).await;
            let response = tokio::select! {
                response = service.answer_after_build(&project, &question) => response,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted");
                    return Ok(());
                }
            };
            print_json(&response)?;
        }
        Command::Compare {
            project,
            query,
            k,
            semantic,
            keyword,
        } => {
            let weights = Weights {
                semantic: semantic.unwrap_or(config.retrieval.semantic_weight),
                keyword: keyword.unwrap_or(config.retrieval.keyword_weight),
            };
            let comparison = service
                .compare_retrieval(&project, &query, k, weights)
                .await
                .with_context(|| format!("retrieval comparison failed for {project}"))?;
            print_json(&comparison)?;
        }
        Command::Build { project } => {
            let outcome = service
                .build_index(&project)
                .await
                .with_context(|| format!("failed to build index for {project}"))?;
            print_json(&outcome)?;
        }
        Command::Regenerate { project } => {
            let rebuilt = service.regenerate_index(&project).await;
            print_json(&json!({ "project": project, "rebuilt": rebuilt }))?;
            if !rebuilt {
                bail!("regenerate produced no index for {project}");
            }
        }
        Command::Validate { project } => {
            print_json(&service.validate_index(&project).await)?;
        }
    }
    Ok(())
}
