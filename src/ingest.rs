//! Ingestion pipeline: files on disk → chunk records in the store.
//!
//! Every file goes through a single routing decision ([`Ingestor::route`]):
//!
//! ```text
//! extension handled by the parser ──▶ parser ──▶ one record per parsed document
//! binary extension, no parser     ──▶ skipped (warning)
//! anything else                   ──▶ UTF-8 / Latin-1 decode ──▶ chunk_text ──▶ records
//! ```
//!
//! Records get a fresh UUID v4 and [`ChunkMetadata`] built from the file's
//! filesystem metadata. A file that fails is logged and reported; it never
//! stops a directory pass.

use anyhow::{Context, Result as AnyResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::{DirEntry, WalkDir};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, IngestConfig};
use crate::error::Result;
use crate::extract;
use crate::models::{ChunkMetadata, ChunkRecord, FileOutcome, IngestionMethod, IngestionReport};
use crate::parser::{extension_of, DocumentParser, BINARY_EXTENSIONS};
use crate::store::StoreAdapter;

/// How a file will be turned into text.
pub enum Route {
    External(Arc<dyn DocumentParser>),
    Text,
    Skip(String),
}

pub struct Ingestor {
    store: Arc<StoreAdapter>,
    parser: Option<Arc<dyn DocumentParser>>,
    chunking: ChunkingConfig,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl Ingestor {
    pub fn new(
        store: Arc<StoreAdapter>,
        parser: Option<Arc<dyn DocumentParser>>,
        chunking: ChunkingConfig,
        ingest: &IngestConfig,
    ) -> AnyResult<Self> {
        Ok(Self {
            store,
            parser,
            chunking,
            exclude: build_globset(&ingest.exclude_globs)?,
            follow_symlinks: ingest.follow_symlinks,
        })
    }

    pub fn parser_name(&self) -> Option<&str> {
        self.parser.as_deref().map(|p| p.name())
    }

    pub fn route(&self, path: &Path) -> Route {
        let ext = extension_of(path);
        if let Some(parser) = &self.parser {
            if parser.handles(&ext) {
                return Route::External(Arc::clone(parser));
            }
        }
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            let reason = match self.parser_name() {
                Some(name) => format!("the {} parser does not handle .{} files", name, ext),
                None => format!(
                    "no document parser available for .{} files (set {} or parser.provider = \"local\")",
                    ext,
                    crate::paths::PARSER_API_KEY_VAR
                ),
            };
            return Route::Skip(reason);
        }
        Route::Text
    }

    /// Regular files under `dir`, recursively, sorted by path. Hidden files
    /// and directories and `exclude_globs` matches are left out.
    pub fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            if self.exclude.is_match(relative) {
                tracing::debug!(file = %relative.display(), "excluded by glob");
                continue;
            }
            files.push(entry.into_path());
        }
        files.sort();
        files
    }

    /// Ingest every file under `dir` with the configured chunking. The
    /// directory is created if it does not exist.
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        method: IngestionMethod,
    ) -> Result<IngestionReport> {
        tokio::fs::create_dir_all(dir).await?;

        let files = self.discover(dir);
        let mut report = IngestionReport::default();
        if files.is_empty() {
            tracing::info!(dir = %dir.display(), "no files found in data directory");
            return Ok(report);
        }
        tracing::info!(dir = %dir.display(), files = files.len(), "starting ingestion");

        for path in &files {
            let outcome = self
                .ingest_file(path, self.chunking.chunk_size, self.chunking.overlap, method)
                .await;
            report.record(&outcome);
        }

        tracing::info!(
            ok = report.files_succeeded,
            failed = report.files_failed,
            skipped = report.files_skipped,
            chunks = report.total_chunks,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Ingest one file. Never panics or returns early on a bad file; the
    /// outcome says what happened.
    pub async fn ingest_file(
        &self,
        path: &Path,
        chunk_size: usize,
        overlap: usize,
        method: IngestionMethod,
    ) -> FileOutcome {
        let file = path.display().to_string();
        let outcome = match self.build_records(path, chunk_size, overlap, method).await {
            Ok(records) if records.is_empty() => FileOutcome::Empty { file },
            Ok(records) => self.store_records(file, &records).await,
            Err(BuildError::Skip(reason)) => FileOutcome::Skipped { file, reason },
            Err(BuildError::Failed(e)) => FileOutcome::Failed {
                file,
                error: format!("{:#}", e),
            },
        };

        match &outcome {
            FileOutcome::Ingested { file, chunks } => {
                tracing::info!(%file, chunks, "ingested")
            }
            FileOutcome::Skipped { file, reason } => tracing::warn!(%file, %reason, "skipped"),
            FileOutcome::Empty { file } => tracing::warn!(%file, "file is empty"),
            FileOutcome::Failed { file, error } => tracing::error!(%file, %error, "ingestion failed"),
        }
        outcome
    }

    async fn store_records(&self, file: String, records: &[ChunkRecord]) -> FileOutcome {
        match self.store.upsert(records).await {
            Ok(outcome) if outcome.failed.is_empty() => FileOutcome::Ingested {
                file,
                chunks: outcome.inserted,
            },
            Ok(outcome) => {
                let (_, first) = &outcome.failed[0];
                FileOutcome::Failed {
                    file,
                    error: format!(
                        "{} of {} chunks rejected by the store: {}",
                        outcome.failed.len(),
                        records.len(),
                        first
                    ),
                }
            }
            Err(e) => FileOutcome::Failed {
                file,
                error: e.to_string(),
            },
        }
    }

    async fn build_records(
        &self,
        path: &Path,
        chunk_size: usize,
        overlap: usize,
        method: IngestionMethod,
    ) -> std::result::Result<Vec<ChunkRecord>, BuildError> {
        let info = FileInfo::read(path).map_err(BuildError::Failed)?;

        let pieces: Vec<(String, serde_json::Map<String, serde_json::Value>)> =
            match self.route(path) {
                Route::Skip(reason) => return Err(BuildError::Skip(reason)),
                Route::External(parser) => parser
                    .parse(path)
                    .await
                    .with_context(|| format!("{} parser failed", parser.name()))
                    .map_err(BuildError::Failed)?
                    .into_iter()
                    .filter(|d| !d.text.trim().is_empty())
                    .map(|d| (d.text, d.metadata))
                    .collect(),
                Route::Text => {
                    let bytes = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))
                        .map_err(BuildError::Failed)?;
                    let text = decode_text(bytes);
                    chunk_text(&text, chunk_size, overlap)
                        .map_err(|e| BuildError::Failed(e.into()))?
                        .into_iter()
                        .map(|c| (c.text, serde_json::Map::new()))
                        .collect()
                }
            };

        let total = pieces.len();
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(index, (text, extra))| ChunkRecord {
                id: uuid::Uuid::new_v4().to_string(),
                metadata: info.metadata(index, total, text.chars().count(), method, extra),
                text,
            })
            .collect())
    }
}

enum BuildError {
    Skip(String),
    Failed(anyhow::Error),
}

/// Decode file bytes as UTF-8, falling back to Latin-1 (which never fails).
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Filesystem facts recorded with every chunk of a file.
#[derive(Debug, Clone)]
struct FileInfo {
    path: String,
    name: String,
    mime: Option<String>,
    size: u64,
    created: Option<String>,
    modified: Option<String>,
}

impl FileInfo {
    fn read(path: &Path) -> AnyResult<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(Self {
            path: path.display().to_string(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string()),
            mime: mime_for_extension(&extension_of(path)).map(str::to_string),
            size: meta.len(),
            created: meta.created().ok().map(format_date),
            modified: meta.modified().ok().map(format_date),
        })
    }

    fn metadata(
        &self,
        chunk_index: usize,
        total_chunks: usize,
        chunk_size: usize,
        method: IngestionMethod,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> ChunkMetadata {
        ChunkMetadata {
            source_file: self.path.clone(),
            file_name: self.name.clone(),
            file_path: self.path.clone(),
            file_type: self.mime.clone(),
            file_size: Some(self.size),
            creation_date: self.created.clone(),
            last_modified_date: self.modified.clone(),
            chunk_index,
            total_chunks,
            chunk_size,
            ingestion_method: method,
            extra,
        }
    }
}

fn format_date(t: std::time::SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(t)
        .format("%Y-%m-%d")
        .to_string()
}

/// MIME type for a lowercase extension, for the common document types.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "html" | "htm" => "text/html",
        "xml" => "text/xml",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "rst" => "text/x-rst",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "js" => "text/javascript",
        "sh" => "application/x-sh",
        "pdf" => extract::MIME_PDF,
        "docx" => extract::MIME_DOCX,
        "pptx" => extract::MIME_PPTX,
        "xlsx" => extract::MIME_XLSX,
        "doc" => "application/msword",
        "ppt" => "application/vnd.ms-powerpoint",
        _ => return None,
    };
    Some(mime)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> AnyResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
