//! Tool layer: the operations exposed to MCP clients.
//!
//! Each operation of [`RagService`] is wrapped in a [`Tool`] with a name, a
//! description agents read to decide when to call it, and a JSON Schema for
//! its parameters. [`ToolRegistry::with_builtins`] holds all six.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ToolRegistry                  │
//! │  ingest_file          query_documents        │
//! │  list_ingested_files  clear_database         │
//! │  reingest_data_directory  get_rag_status     │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!                  RagService (via ToolContext)
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::service::RagService;

/// An operation that MCP clients can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"query_documents"`).
    fn name(&self) -> &str;

    /// Shown to agents during discovery.
    fn description(&self) -> &str;

    /// Whether the tool leaves the store untouched. Defaults to `false`.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether the tool removes stored documents. Defaults to `false`.
    fn is_destructive(&self) -> bool {
        false
    }

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object. Operations report
    /// their own failures as text; `Err` is reserved for malformed parameters.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool can reach while executing.
#[derive(Clone)]
pub struct ToolContext {
    pub service: Arc<RagService>,
}

impl ToolContext {
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }
}

fn int_param(params: &Value, key: &str, default: i64) -> Result<i64> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => match v.as_i64() {
            Some(n) => Ok(n),
            None => bail!("{} must be an integer", key),
        },
    }
}

fn bool_param(params: &Value, key: &str, default: bool) -> Result<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => bail!("{} must be a boolean", key),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s),
        None | Some(Value::Null) => bail!("{} is required", key),
        Some(_) => bail!("{} must be a string", key),
    }
}

// ── Built-in tools ───────────────────────────────────────────────────────

pub struct IngestFileTool;

#[async_trait]
impl Tool for IngestFileTool {
    fn name(&self) -> &str {
        "ingest_file"
    }

    fn description(&self) -> &str {
        "Ingest a single text file into the vector database. The file is split into \
         overlapping chunks that respect word boundaries, and each chunk is stored with \
         its source path and position for later semantic search."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to the file to ingest" },
                "chunk_size": { "type": "integer", "description": "Maximum characters per chunk", "default": 5000 },
                "overlap": { "type": "integer", "description": "Characters shared by consecutive chunks", "default": 800 }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let chunking = &ctx.service.config().chunking;
        let file_path = str_param(&params, "file_path")?;
        let chunk_size = int_param(&params, "chunk_size", chunking.chunk_size as i64)?;
        let overlap = int_param(&params, "overlap", chunking.overlap as i64)?;
        Ok(Value::String(
            ctx.service.ingest_file(file_path, chunk_size, overlap).await,
        ))
    }
}

pub struct QueryDocumentsTool;

#[async_trait]
impl Tool for QueryDocumentsTool {
    fn name(&self) -> &str {
        "query_documents"
    }

    fn description(&self) -> &str {
        "Query the local document knowledge base with semantic search. Returns the most \
         relevant text passages with their source file, chunk position and similarity \
         score. n_results is clamped to 1..=20 (values <= 0 use the default of 5)."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to search for" },
                "n_results": { "type": "integer", "description": "Number of results (max 20)", "default": 5 },
                "include_metadata": { "type": "boolean", "description": "Include source, chunk position and score", "default": true }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = str_param(&params, "query")?;
        let default_n = ctx.service.config().retrieval.default_results;
        let n_results = int_param(&params, "n_results", default_n)?;
        let include_metadata = bool_param(&params, "include_metadata", true)?;
        Ok(Value::String(
            ctx.service
                .query_documents(query, n_results, include_metadata)
                .await,
        ))
    }
}

pub struct ListIngestedFilesTool;

#[async_trait]
impl Tool for ListIngestedFilesTool {
    fn name(&self) -> &str {
        "list_ingested_files"
    }

    fn description(&self) -> &str {
        "List every file in the vector database with its path, type, size, dates, \
         chunk count, total chunk size and ingestion method, followed by corpus totals."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(Value::String(ctx.service.list_ingested_files().await))
    }
}

pub struct ClearDatabaseTool;

#[async_trait]
impl Tool for ClearDatabaseTool {
    fn name(&self) -> &str {
        "clear_database"
    }

    fn description(&self) -> &str {
        "Remove all documents from the vector database."
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(Value::String(ctx.service.clear_database().await))
    }
}

pub struct ReingestDataDirectoryTool;

#[async_trait]
impl Tool for ReingestDataDirectoryTool {
    fn name(&self) -> &str {
        "reingest_data_directory"
    }

    fn description(&self) -> &str {
        "Clear the vector database and ingest every file in the configured data directory \
         from scratch. Use after adding or changing files in the data directory."
    }

    fn is_destructive(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(Value::String(ctx.service.reingest_data_directory().await))
    }
}

pub struct RagStatusTool;

#[async_trait]
impl Tool for RagStatusTool {
    fn name(&self) -> &str {
        "get_rag_status"
    }

    fn description(&self) -> &str {
        "Report the state of the RAG system: store readiness and document count, \
         database and data directory locations and where they came from, relevant \
         environment variables (secrets redacted) and the directory resolution order."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(ctx.service.get_status().await)
    }
}

/// Ordered collection of tools, looked up by name.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(IngestFileTool));
        registry.register(Box::new(QueryDocumentsTool));
        registry.register(Box::new(ListIngestedFilesTool));
        registry.register(Box::new(ClearDatabaseTool));
        registry.register(Box::new(ReingestDataDirectoryTool));
        registry.register(Box::new(RagStatusTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
