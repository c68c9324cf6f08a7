//! Configuration loading.
//!
//! Tunables live in an optional TOML file; directory locations and the
//! parser credential come from the environment (see [`crate::paths`]).
//! Both are read once at startup and passed to [`crate::service::RagService`].
//!
//! ```toml
//! [store]
//! collection_name = "rag_documents"
//! reset_on_startup = true
//!
//! [chunking]
//! chunk_size = 5000
//! overlap = 800
//!
//! [embedding]
//! provider = "local"          # local | ollama | hash
//! model = "all-minilm-l6-v2"
//!
//! [parser]
//! provider = "auto"           # auto | llamaparse | local | none
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::paths::EnvSnapshot;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Process environment, captured by [`load_config`]. Never deserialized.
    #[serde(skip)]
    pub env: EnvSnapshot,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Wipe the store directory before serving. `false` reopens the existing store.
    #[serde(default = "default_true")]
    pub reset_on_startup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection_name: default_collection_name(),
            reset_on_startup: true,
        }
    }
}

fn default_collection_name() -> String {
    "rag_documents".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    5000
}
fn default_overlap() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_results")]
    pub default_results: i64,
    #[serde(default = "default_max_results")]
    pub max_results: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_results: default_results(),
            max_results: default_max_results(),
        }
    }
}

fn default_results() -> i64 {
    5
}
fn default_max_results() -> i64 {
    20
}

impl RetrievalConfig {
    /// Clamp a requested result count: non-positive → default, above max → max.
    pub fn clamp_results(&self, requested: i64) -> usize {
        if requested <= 0 {
            self.default_results as usize
        } else if requested > self.max_results {
            self.max_results as usize
        } else {
            requested as usize
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for HTTP providers (Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    if cfg!(feature = "local-embeddings") {
        "local".to_string()
    } else {
        "hash".to_string()
    }
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default = "default_parser_provider")]
    pub provider: String,
    #[serde(default = "default_parser_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            provider: default_parser_provider(),
            base_url: default_parser_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

fn default_parser_provider() -> String {
    "auto".to_string()
}
fn default_parser_base_url() -> String {
    "https://api.cloud.llamaindex.ai".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_polls() -> u32 {
    300
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    /// Extra glob patterns (relative to the data directory) to skip.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// Load configuration from an optional TOML file and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config: Config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };
    config.env = EnvSnapshot::capture();
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.store.collection_name.trim().is_empty() {
        bail!("store.collection_name must not be empty");
    }

    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.default_results < 1 {
        bail!("retrieval.default_results must be >= 1");
    }
    if config.retrieval.max_results < config.retrieval.default_results {
        bail!("retrieval.max_results must be >= retrieval.default_results");
    }

    match config.embedding.provider.as_str() {
        "local" | "ollama" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, ollama, or hash.",
            other
        ),
    }
    if config.embedding.provider == "ollama" && config.embedding.model.is_none() {
        bail!("embedding.model must be specified when provider is 'ollama'");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    match config.parser.provider.as_str() {
        "auto" | "llamaparse" | "local" | "none" => {}
        other => bail!(
            "Unknown parser provider: '{}'. Must be auto, llamaparse, local, or none.",
            other
        ),
    }

    Ok(())
}
