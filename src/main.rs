//! # FlowFactor Knowledge Base CLI (`kb`)
//!
//! The `kb` binary is the operational interface to the knowledge-base
//! pipeline: database initialization, document ingestion, search,
//! embedding backfill, and the HTTP server behind the site's widgets.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and run schema migrations |
//! | `kb ingest <path>` | Ingest an extracted-text file |
//! | `kb list` | List ingested documents |
//! | `kb delete <fileName>` | Remove a document and all its chunks |
//! | `kb search "<query>"` | Ranked chunk search |
//! | `kb ask "<question>"` | Formatted natural-language answer |
//! | `kb category <fileName> <category>` | Re-categorize a document |
//! | `kb embed` | Backfill missing embedding vectors |
//! | `kb serve` | Start the HTTP server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use flowfactor_kb::config;
use flowfactor_kb::embed_cmd;
use flowfactor_kb::error::StoreError;
use flowfactor_kb::format;
use flowfactor_kb::ingest;
use flowfactor_kb::migrate;
use flowfactor_kb::models::Category;
use flowfactor_kb::search;
use flowfactor_kb::server;
use flowfactor_kb::store::{KnowledgeStore, SqliteStore};

/// FlowFactor knowledge base — document ingestion and retrieval.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "FlowFactor knowledge base — document ingestion and retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a document from an extracted-text file.
    ///
    /// The file's contents are chunked, optionally embedded, and stored.
    /// Re-ingesting a filename with changed content replaces its chunks;
    /// identical content is skipped.
    Ingest {
        /// Path to a UTF-8 text file (extraction happens upstream).
        path: PathBuf,

        /// Logical document name; defaults to the file's basename.
        #[arg(long)]
        name: Option<String>,

        /// Source URL the text was extracted from, recorded for dedup.
        #[arg(long)]
        url: Option<String>,

        /// Category: knowledge-base, uploads, procurement, analysis-only.
        #[arg(long, default_value = "knowledge-base")]
        category: String,
    },

    /// List distinct ingested document names.
    List,

    /// Delete a document and every chunk stored under its name.
    Delete {
        /// Document filename as shown by `kb list`.
        file_name: String,
    },

    /// Search stored chunks and print ranked results.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Ask a question and print a formatted natural-language answer.
    Ask { question: String },

    /// Change a document's category.
    Category {
        file_name: String,
        /// knowledge-base, uploads, procurement, or analysis-only.
        category: String,
    },

    /// Backfill embeddings for chunks ingested without vectors.
    Embed {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the HTTP server for the site's knowledge and chat widgets.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg).await?;
            migrate::run_migrations(store.pool()).await?;
            store.pool().close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            name,
            url,
            category,
        } => {
            let file_name = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let category: Category = category.parse()?;
            let text = std::fs::read_to_string(&path)?;

            let store = open_store(&cfg).await?;
            let outcome = ingest::ingest_document(
                store.as_ref(),
                &cfg,
                &file_name,
                &text,
                url.as_deref(),
                category,
            )
            .await?;

            if outcome.skipped_duplicate {
                println!("'{}' already ingested, skipped", file_name);
            } else {
                println!(
                    "'{}' ingested as {} chunks",
                    file_name, outcome.chunks_created
                );
            }
        }
        Commands::List => {
            let store = open_store(&cfg).await?;
            let documents = store.list_documents().await?;
            if documents.is_empty() {
                println!("No documents.");
            } else {
                for name in documents {
                    println!("{}", name);
                }
            }
        }
        Commands::Delete { file_name } => {
            let store = open_store(&cfg).await?;
            let removed = store.delete_document(&file_name).await?;
            println!("'{}' deleted ({} chunks removed)", file_name, removed);
        }
        Commands::Search { query, limit } => {
            let store = open_store(&cfg).await?;
            let (results, mode) =
                search::search_chunks(store.as_ref(), &cfg, &query, limit).await?;

            if results.is_empty() {
                println!("No results.");
            } else {
                println!("mode: {:?}", mode);
                for (i, result) in results.iter().enumerate() {
                    let snippet: String = result.chunk.text.chars().take(120).collect();
                    println!(
                        "{}. [{:.3}] {} #{}",
                        i + 1,
                        result.score,
                        result.chunk.metadata.file_name,
                        result.chunk.metadata.chunk_index
                    );
                    println!("    \"{}\"", snippet.replace('\n', " ").trim());
                }
            }
        }
        Commands::Ask { question } => {
            let store = open_store(&cfg).await?;
            let (results, _mode) =
                search::search_chunks(store.as_ref(), &cfg, &question, None).await?;
            println!(
                "{}",
                format::format_answer(&results, &question, cfg.retrieval.snippet_chars)
            );
        }
        Commands::Category {
            file_name,
            category,
        } => {
            let category: Category = category.parse()?;
            let store = open_store(&cfg).await?;
            let doc = store
                .get_document(&file_name)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("document '{}'", file_name)))?;
            store.update_category(&doc.id, category).await?;
            println!("'{}' category set to {}", file_name, category);
        }
        Commands::Embed { limit, dry_run } => {
            let store = open_store(&cfg).await?;
            embed_cmd::run_embed_pending(store.as_ref(), &cfg, limit, dry_run).await?;
        }
        Commands::Serve => {
            let store = open_store(&cfg).await?;
            server::run_server(&cfg, store).await?;
        }
    }

    Ok(())
}

async fn open_store(cfg: &config::Config) -> Result<Arc<dyn KnowledgeStore>> {
    let store = SqliteStore::open(cfg).await?;
    migrate::run_migrations(store.pool()).await?;
    Ok(Arc::new(store))
}
