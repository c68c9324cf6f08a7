//! Document parsers for binary formats.
//!
//! A [`DocumentParser`] turns one file into one or more [`ParsedDocument`]s.
//! Two implementations exist:
//!
//! - [`LlamaParseParser`]: uploads the file to the LlamaParse cloud API and
//!   polls for the plain-text result. Needs `LLAMA_CLOUD_API_KEY`.
//! - [`LocalParser`]: extracts text in-process via [`crate::extract`].
//!
//! [`select_parser`] picks one from `[parser] provider`:
//!
//! | Provider | Result |
//! |----------|--------|
//! | `auto` | LlamaParse if the API key is set, otherwise no parser |
//! | `llamaparse` | LlamaParse; error without the API key |
//! | `local` | [`LocalParser`] |
//! | `none` | no parser |
//!
//! With no parser, binary documents are skipped during ingestion.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ParserConfig;
use crate::extract::{self, DocumentKind, ExtractError};
use crate::paths::{EnvSnapshot, PARSER_API_KEY_VAR};

/// Extensions that are never decoded as text.
pub const BINARY_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "ppt", "pptx", "xlsx"];

/// Extensions the cloud parser accepts.
pub const LLAMAPARSE_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "ppt", "pptx"];

/// One logical document produced by a parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub text: String,
    /// Extra keys merged into the chunk metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    fn name(&self) -> &str;
    /// Whether this parser accepts files with the lowercase extension `ext`.
    fn handles(&self, ext: &str) -> bool;
    async fn parse(&self, path: &Path) -> Result<Vec<ParsedDocument>>;
}

/// Build the parser selected by configuration, if any.
pub fn select_parser(
    config: &ParserConfig,
    env: &EnvSnapshot,
) -> Result<Option<Arc<dyn DocumentParser>>> {
    match config.provider.as_str() {
        "none" => Ok(None),
        "local" => Ok(Some(Arc::new(LocalParser))),
        "llamaparse" => match &env.parser_api_key {
            Some(key) => Ok(Some(Arc::new(LlamaParseParser::new(config, key.clone())?))),
            None => bail!(
                "parser.provider = \"llamaparse\" requires {} to be set",
                PARSER_API_KEY_VAR
            ),
        },
        "auto" => match &env.parser_api_key {
            Some(key) => Ok(Some(Arc::new(LlamaParseParser::new(config, key.clone())?))),
            None => {
                tracing::warn!(
                    "{} not set. PDF and Office documents will be skipped.",
                    PARSER_API_KEY_VAR
                );
                Ok(None)
            }
        },
        other => bail!("Unknown parser provider: {}", other),
    }
}

// ============ Local ============

/// In-process extraction of PDF, DOCX, PPTX and XLSX.
pub struct LocalParser;

#[async_trait]
impl DocumentParser for LocalParser {
    fn name(&self) -> &str {
        "local"
    }

    fn handles(&self, ext: &str) -> bool {
        DocumentKind::from_extension(ext).is_some()
    }

    async fn parse(&self, path: &Path) -> Result<Vec<ParsedDocument>> {
        let ext = extension_of(path);
        let kind = DocumentKind::from_extension(&ext)
            .ok_or_else(|| ExtractError::UnsupportedFormat(ext.clone()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let sections =
            tokio::task::spawn_blocking(move || extract::extract_sections(&bytes, kind)).await??;

        Ok(sections
            .into_iter()
            .map(|section| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("parser".to_string(), "local".into());
                if let Some(label) = section.label {
                    metadata.insert("section".to_string(), label.into());
                }
                ParsedDocument {
                    text: section.text,
                    metadata,
                }
            })
            .collect())
    }
}

// ============ LlamaParse ============

/// Client for the LlamaParse REST API.
///
/// Flow: `POST /api/parsing/upload` (multipart) → poll
/// `GET /api/parsing/job/{id}` until `SUCCESS` → fetch
/// `GET /api/parsing/job/{id}/result/text`.
pub struct LlamaParseParser {
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextResult {
    text: String,
}

impl LlamaParseParser {
    pub fn new(config: &ParserConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
            client,
        })
    }

    async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("LlamaParse upload request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("LlamaParse upload error {}: {}", status, body);
        }
        let job: JobResponse = resp.json().await.context("Invalid LlamaParse upload response")?;
        Ok(job.id)
    }

    async fn wait_for(&self, job_id: &str) -> Result<()> {
        for attempt in 0..self.max_polls {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
            let resp = self
                .client
                .get(format!("{}/api/parsing/job/{}", self.base_url, job_id))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .context("LlamaParse status request failed")?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!("LlamaParse status error {}: {}", status, body);
            }
            let job: JobResponse = resp.json().await?;
            match job.status.as_deref().unwrap_or("PENDING") {
                "SUCCESS" => return Ok(()),
                "ERROR" | "CANCELED" | "CANCELLED" => {
                    bail!("LlamaParse job {} ended with status {:?}", job.id, job.status)
                }
                _ => tracing::debug!(job = %job_id, attempt, "parse job pending"),
            }
        }
        bail!(
            "LlamaParse job {} did not finish after {} polls",
            job_id,
            self.max_polls
        )
    }

    async fn fetch_text(&self, job_id: &str) -> Result<String> {
        let resp = self
            .client
            .get(format!(
                "{}/api/parsing/job/{}/result/text",
                self.base_url, job_id
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("LlamaParse result request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("LlamaParse result error {}: {}", status, body);
        }
        let result: TextResult = resp.json().await.context("Invalid LlamaParse result")?;
        Ok(result.text)
    }
}

#[async_trait]
impl DocumentParser for LlamaParseParser {
    fn name(&self) -> &str {
        "llamaparse"
    }

    fn handles(&self, ext: &str) -> bool {
        LLAMAPARSE_EXTENSIONS.contains(&ext)
    }

    async fn parse(&self, path: &Path) -> Result<Vec<ParsedDocument>> {
        let job_id = self.upload(path).await?;
        tracing::info!(file = %path.display(), job = %job_id, "submitted to LlamaParse");
        self.wait_for(&job_id).await?;
        let text = self.fetch_text(&job_id).await?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut metadata = serde_json::Map::new();
        metadata.insert("parser".to_string(), "llamaparse".into());
        metadata.insert("job_id".to_string(), job_id.into());
        Ok(vec![ParsedDocument { text, metadata }])
    }
}

/// Lowercase extension of `path`, without the dot; empty if none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path as UrlPath;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn env_with_key(key: Option<&str>) -> EnvSnapshot {
        EnvSnapshot {
            parser_api_key: key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn selection_follows_provider_and_key() {
        let mut cfg = ParserConfig::default();
        assert!(select_parser(&cfg, &env_with_key(None)).unwrap().is_none());

        let p = select_parser(&cfg, &env_with_key(Some("k"))).unwrap().unwrap();
        assert_eq!(p.name(), "llamaparse");

        cfg.provider = "local".to_string();
        let p = select_parser(&cfg, &env_with_key(None)).unwrap().unwrap();
        assert_eq!(p.name(), "local");

        cfg.provider = "none".to_string();
        assert!(select_parser(&cfg, &env_with_key(Some("k"))).unwrap().is_none());

        cfg.provider = "llamaparse".to_string();
        assert!(select_parser(&cfg, &env_with_key(None)).is_err());
    }

    #[test]
    fn handled_extensions() {
        assert!(LocalParser.handles("xlsx"));
        assert!(!LocalParser.handles("doc"));
        let lp = LlamaParseParser::new(&ParserConfig::default(), "k".into()).unwrap();
        assert!(lp.handles("ppt"));
        assert!(!lp.handles("xlsx"));
        assert!(!lp.handles("txt"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("/a/Report.PDF")), "pdf");
        assert_eq!(extension_of(Path::new("/a/README")), "");
    }

    #[tokio::test]
    async fn local_parser_rejects_garbage_pdf() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();
        assert!(LocalParser.parse(&path).await.is_err());
    }

    async fn spawn_mock_llamaparse(pending_polls: usize) -> String {
        let polls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/api/parsing/upload",
                post(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    assert_eq!(auth, "Bearer test-key");
                    Json(serde_json::json!({ "id": "job-1", "status": "PENDING" }))
                }),
            )
            .route(
                "/api/parsing/job/{id}",
                get(move |UrlPath(id): UrlPath<String>| {
                    let polls = Arc::clone(&polls);
                    async move {
                        let n = polls.fetch_add(1, Ordering::SeqCst);
                        let status = if n < pending_polls { "PENDING" } else { "SUCCESS" };
                        Json(serde_json::json!({ "id": id, "status": status }))
                    }
                }),
            )
            .route(
                "/api/parsing/job/{id}/result/text",
                get(|| async { Json(serde_json::json!({ "text": "Parsed quarterly report" })) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn llamaparse_uploads_polls_and_fetches_text() {
        let base_url = spawn_mock_llamaparse(2).await;
        let cfg = ParserConfig {
            base_url,
            poll_interval_ms: 5,
            max_polls: 10,
            ..Default::default()
        };
        let parser = LlamaParseParser::new(&cfg, "test-key".to_string()).unwrap();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();

        let docs = parser.parse(&path).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Parsed quarterly report");
        assert_eq!(docs[0].metadata["parser"], "llamaparse");
        assert_eq!(docs[0].metadata["job_id"], "job-1");
    }

    #[tokio::test]
    async fn llamaparse_gives_up_after_max_polls() {
        let base_url = spawn_mock_llamaparse(usize::MAX).await;
        let cfg = ParserConfig {
            base_url,
            poll_interval_ms: 1,
            max_polls: 3,
            ..Default::default()
        };
        let parser = LlamaParseParser::new(&cfg, "test-key".to_string()).unwrap();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("slow.docx");
        std::fs::write(&path, b"PK").unwrap();

        let err = parser.parse(&path).await.unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }
}
