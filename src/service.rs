//! The RAG service: one object owning the store, the ingestion pipeline
//! and the resolved configuration.
//!
//! Every caller-facing operation returns text (or JSON for status) and never
//! an error: configuration problems come back as their remediation message,
//! validation problems as `Error: ...`, and engine failures as
//! `Error <doing X>: <cause>`. This is what the MCP tools hand to the client.

use anyhow::Result as AnyResult;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::Result;
use crate::ingest::Ingestor;
use crate::models::{FileOutcome, IngestionMethod, IngestionReport};
use crate::parser::select_parser;
use crate::paths::{resolve_data_dir, resolve_store_dir, ResolvedDir};
use crate::retrieval::{self, DataDirStatus, StatusSnapshot};
use crate::store::{SqliteEngine, StoreAdapter, VectorEngine};

pub struct RagService {
    config: Config,
    store: Arc<StoreAdapter>,
    store_dir: ResolvedDir,
    ingestor: Ingestor,
}

impl RagService {
    /// Build the service with the SQLite engine and the configured embedder.
    pub fn from_config(config: Config) -> AnyResult<Self> {
        let embedder = create_embedder(&config.embedding)?;
        tracing::info!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            "embedding provider ready"
        );
        let engine = Arc::new(SqliteEngine::new(embedder, config.embedding.batch_size));
        Self::with_engine(config, engine)
    }

    /// Build the service around an arbitrary engine. The store is not opened
    /// until [`bootstrap`](Self::bootstrap) or [`open`](Self::open).
    pub fn with_engine(config: Config, engine: Arc<dyn VectorEngine>) -> AnyResult<Self> {
        let store_dir = resolve_store_dir(&config.env)?;
        let parser = select_parser(&config.parser, &config.env)?;
        let store = Arc::new(StoreAdapter::new(
            engine,
            store_dir.path.clone(),
            config.store.collection_name.clone(),
        ));
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            parser,
            config.chunking.clone(),
            &config.ingest,
        )?;

        Ok(Self {
            config,
            store,
            store_dir,
            ingestor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StoreAdapter {
        &self.store
    }

    /// Server startup: prepare the store per `store.reset_on_startup`, then
    /// ingest the data directory if one is configured.
    ///
    /// A store that was reopened (not reset) and already holds records is
    /// not ingested again. Returns the ingestion report when a pass ran.
    pub async fn bootstrap(&self) -> Result<Option<IngestionReport>> {
        let reset = self.config.store.reset_on_startup;
        if reset {
            self.store.reset_and_create().await?;
        } else {
            self.store.open_or_create().await?;
        }

        let data_dir = match resolve_data_dir(&self.config.env) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(variable = e.variable, "skipping auto-ingestion: no data directory");
                return Ok(None);
            }
        };

        if !reset && self.store.count().await? > 0 {
            tracing::info!("store already populated; skipping auto-ingestion");
            return Ok(None);
        }

        match self
            .ingestor
            .ingest_directory(&data_dir.path, IngestionMethod::AutoIngest)
            .await
        {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                tracing::error!(error = %e, "auto-ingestion failed");
                Ok(None)
            }
        }
    }

    /// Open the existing store without resetting or ingesting.
    pub async fn open(&self) -> Result<()> {
        self.store.open_or_create().await
    }

    /// Returns the remediation message when no data directory is configured.
    fn data_dir_or_message(&self) -> std::result::Result<ResolvedDir, String> {
        resolve_data_dir(&self.config.env).map_err(|e| e.message)
    }

    // ── Operations ───────────────────────────────────────────────────────

    pub async fn ingest_file(&self, file_path: &str, chunk_size: i64, overlap: i64) -> String {
        if chunk_size <= 0 {
            return "Error: chunk_size must be greater than 0.".to_string();
        }
        if overlap < 0 {
            return "Error: overlap must not be negative.".to_string();
        }
        if overlap >= chunk_size {
            return format!(
                "Error: overlap ({}) must be smaller than chunk_size ({}).",
                overlap, chunk_size
            );
        }

        let path = Path::new(file_path);
        if !path.exists() {
            return format!("Error: File '{}' does not exist.", file_path);
        }
        if !path.is_file() {
            return format!("Error: '{}' is not a file.", file_path);
        }

        let outcome = self
            .ingestor
            .ingest_file(
                path,
                chunk_size as usize,
                overlap as usize,
                IngestionMethod::Manual,
            )
            .await;

        match outcome {
            FileOutcome::Ingested { chunks, .. } => format!(
                "Successfully ingested '{}' into vector database. Created {} chunks.",
                file_path, chunks
            ),
            FileOutcome::Empty { .. } => format!("Error: File '{}' is empty.", file_path),
            FileOutcome::Skipped { reason, .. } => {
                format!("Error ingesting file '{}': {}", file_path, reason)
            }
            FileOutcome::Failed { error, .. } => {
                format!("Error ingesting file '{}': {}", file_path, error)
            }
        }
    }

    pub async fn query_documents(&self, query: &str, n_results: i64, include_metadata: bool) -> String {
        if let Err(message) = self.data_dir_or_message() {
            return message;
        }
        if query.trim().is_empty() {
            return retrieval::EMPTY_QUERY.to_string();
        }

        let k = self.config.retrieval.clamp_results(n_results);
        match self.store.query(query, k).await {
            Ok(hits) => {
                tracing::info!(query, results = hits.len(), "query answered");
                retrieval::format_query_results(query, &hits, include_metadata)
            }
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                format!("Error querying documents: {}", e)
            }
        }
    }

    pub async fn list_ingested_files(&self) -> String {
        if let Err(message) = self.data_dir_or_message() {
            return message;
        }
        match self.store.scan_metadata().await {
            Ok(metas) => retrieval::format_file_list(&retrieval::summarize_files(&metas)),
            Err(e) => {
                tracing::error!(error = %e, "listing failed");
                format!("Error listing ingested files: {}", e)
            }
        }
    }

    pub async fn clear_database(&self) -> String {
        let before = match self.store.count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "clear failed: could not count documents");
                return format!("Error clearing database: {}", e);
            }
        };
        match self.store.recreate_collection().await {
            Ok(()) => {
                tracing::info!(cleared = before, "database cleared");
                format!(
                    "Successfully cleared {} documents from the vector database.",
                    before
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "clear failed");
                format!("Error clearing database: {}", e)
            }
        }
    }

    /// Drop the collection and ingest the data directory from scratch. Not
    /// atomic: a failure part-way leaves a partial collection.
    pub async fn reingest_data_directory(&self) -> String {
        let data_dir = match self.data_dir_or_message() {
            Ok(dir) => dir,
            Err(message) => return message,
        };

        let result = async {
            tracing::info!("clearing collection before reingestion");
            self.store.recreate_collection().await?;
            self.ingestor
                .ingest_directory(&data_dir.path, IngestionMethod::AutoIngest)
                .await?;
            self.store.count().await
        }
        .await;

        match result {
            Ok(count) => {
                let msg = format!(
                    "Successfully reingested data directory. Database now contains {} documents.",
                    count
                );
                tracing::info!("{}", msg);
                msg
            }
            Err(e) => {
                tracing::error!(error = %e, "reingestion failed");
                format!("Error during reingestion: {}", e)
            }
        }
    }

    /// JSON snapshot of the service, store and directory configuration.
    pub async fn get_status(&self) -> Value {
        let database_initialized = self.store.is_open().await;
        let collection_ready = self.store.is_ready().await;

        let total_documents = if collection_ready {
            match self.store.count().await {
                Ok(n) => n,
                Err(e) => return retrieval::status_error_json(&e.to_string()),
            }
        } else {
            0
        };

        let data_dir = match resolve_data_dir(&self.config.env) {
            Ok(dir) => DataDirStatus::Configured {
                exists: dir.path.exists(),
                path: dir.path.display().to_string(),
                source: dir_source_name(&dir),
            },
            Err(e) => DataDirStatus::Missing { error: e.message },
        };

        let env = &self.config.env;
        retrieval::status_json(&StatusSnapshot {
            database_initialized,
            collection_ready,
            total_documents,
            engine: self.store.engine_kind().to_string(),
            store_dir: self.store_dir.path.display().to_string(),
            store_dir_exists: self.store_dir.path.exists(),
            store_source: dir_source_name(&self.store_dir),
            collection_name: self.store.collection_name().to_string(),
            data_dir,
            env_data_dir: env.data_dir.clone(),
            env_db_dir: env.db_dir.clone(),
            api_key_set: env.parser_api_key.is_some(),
            parser: self.ingestor.parser_name().map(str::to_string),
            embedding_provider: self.config.embedding.provider.clone(),
        })
    }

    pub fn analysis_prompt(&self, topic: &str) -> String {
        retrieval::analysis_prompt(topic)
    }
}

fn dir_source_name(dir: &ResolvedDir) -> String {
    serde_json::to_value(dir.source)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
