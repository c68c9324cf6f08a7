//! # RAG server CLI (`rag-server`)
//!
//! Runs the MCP server, or performs a single operation against the store
//! and prints the same text an MCP client would receive.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-server serve` | Start the MCP server (stdio by default) |
//! | `rag-server ingest <path>` | Ingest one file |
//! | `rag-server query "<text>"` | Semantic search |
//! | `rag-server list` | List ingested files |
//! | `rag-server status` | Print the status JSON |
//! | `rag-server clear` | Remove every document |
//! | `rag-server reingest` | Clear and ingest the data directory again |
//!
//! ## Examples
//!
//! ```bash
//! LLAMA_RAG_DATA_DIR=~/docs rag-server serve
//! rag-server serve --transport http --bind 127.0.0.1:7340
//! rag-server query "deployment checklist" --limit 3
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change the level.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rag_server::config;
use rag_server::server;
use rag_server::service::RagService;

/// Local document ingestion and semantic retrieval for MCP clients.
#[derive(Parser)]
#[command(name = "rag-server", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server.
    ///
    /// Resets the store (unless `store.reset_on_startup = false`) and
    /// ingests the data directory before accepting requests.
    Serve {
        #[arg(long, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,

        /// Address for the http transport. Overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ingest a single file.
    Ingest {
        path: String,

        #[arg(long)]
        chunk_size: Option<i64>,

        #[arg(long)]
        overlap: Option<i64>,
    },

    /// Search the ingested documents.
    Query {
        query: String,

        /// Number of results (clamped to the configured maximum).
        #[arg(long)]
        limit: Option<i64>,

        /// Print passages without source and score lines.
        #[arg(long)]
        no_metadata: bool,
    },

    /// List ingested files with their statistics.
    List,

    /// Print the status JSON.
    Status,

    /// Remove every document from the store.
    Clear,

    /// Clear the store and ingest the data directory again.
    Reingest,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rag_server=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;
    let service = Arc::new(RagService::from_config(cfg)?);

    match cli.command {
        Commands::Serve { transport, bind } => {
            if let Some(report) = service.bootstrap().await? {
                tracing::info!(
                    succeeded = report.files_succeeded,
                    skipped = report.files_skipped,
                    failed = report.files_failed,
                    chunks = report.total_chunks,
                    "startup ingestion finished"
                );
            }
            match transport {
                Transport::Stdio => server::run_stdio(Arc::clone(&service)).await?,
                Transport::Http => {
                    let bind = bind.unwrap_or_else(|| service.config().server.bind.clone());
                    server::run_http(Arc::clone(&service), &bind).await?;
                }
            }
        }
        Commands::Ingest {
            path,
            chunk_size,
            overlap,
        } => {
            service.open().await?;
            let chunking = &service.config().chunking;
            let chunk_size = chunk_size.unwrap_or(chunking.chunk_size as i64);
            let overlap = overlap.unwrap_or(chunking.overlap as i64);
            println!("{}", service.ingest_file(&path, chunk_size, overlap).await);
        }
        Commands::Query {
            query,
            limit,
            no_metadata,
        } => {
            service.open().await?;
            let limit = limit.unwrap_or(service.config().retrieval.default_results);
            println!(
                "{}",
                service.query_documents(&query, limit, !no_metadata).await
            );
        }
        Commands::List => {
            service.open().await?;
            println!("{}", service.list_ingested_files().await);
        }
        Commands::Status => {
            service.open().await?;
            let status = service.get_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Clear => {
            service.open().await?;
            println!("{}", service.clear_database().await);
        }
        Commands::Reingest => {
            service.open().await?;
            println!("{}", service.reingest_data_directory().await);
        }
    }

    service.store().close().await;
    Ok(())
}
