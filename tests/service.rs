//! Service-level tests: every client-facing operation against an in-memory
//! engine and the hash embedder, with a hand-built environment so nothing
//! depends on the real process environment.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rag_server::chunk::chunk_text;
use rag_server::config::Config;
use rag_server::embedding::{Embedder, HashEmbedder};
use rag_server::error::RagError;
use rag_server::paths::EnvSnapshot;
use rag_server::retrieval::{thousands, EMPTY_QUERY, NOTHING_INGESTED};
use rag_server::service::RagService;
use rag_server::store::{MemoryEngine, SqliteEngine, VectorEngine};
use rag_server::tools::{ToolContext, ToolRegistry};
use serde_json::json;
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    data: PathBuf,
    db: PathBuf,
    scratch: PathBuf,
}

impl Harness {
    /// Temp layout: `data/` (only when `with_data`), `db/`, `scratch/`.
    fn new(with_data: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        if with_data {
            fs::create_dir_all(&data).unwrap();
        }
        let scratch = tmp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        Self {
            db: tmp.path().join("db"),
            data,
            scratch,
            _tmp: tmp,
        }
    }

    fn config(&self, with_data: bool) -> Config {
        let mut config = Config::default();
        config.parser.provider = "local".to_string();
        config.env = EnvSnapshot {
            data_dir: with_data.then(|| self.data.display().to_string()),
            db_dir: Some(self.db.display().to_string()),
            xdg_data_home: None,
            home: None,
            parser_api_key: None,
            cwd: self.scratch.clone(),
        };
        config
    }

    fn service(&self) -> RagService {
        self.service_with(self.config(self.data.is_dir()))
    }

    fn service_with(&self, config: Config) -> RagService {
        RagService::with_engine(config, memory_engine()).unwrap()
    }
}

fn memory_engine() -> Arc<dyn VectorEngine> {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(HashEmbedder::DEFAULT_DIMS));
    Arc::new(MemoryEngine::new(embedder))
}

fn write(path: &Path, text: &str) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

fn result_blocks(out: &str) -> usize {
    out.matches("--- Result ").count()
}

fn long_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============ Startup ============

#[tokio::test]
async fn bootstrap_ingests_data_directory() {
    let h = Harness::new(true);
    write(
        &h.data.join("rust.txt"),
        "Rust ownership and borrowing rules keep memory safe without a garbage collector.",
    );
    write(
        &h.data.join("fruit.md"),
        "Banana smoothie recipe with mango and fresh fruit.",
    );

    let service = h.service();
    let report = service.bootstrap().await.unwrap().expect("ingestion ran");
    assert_eq!(report.files_succeeded, 2);
    assert_eq!(report.files_failed, 0);
    assert_eq!(service.store().count().await.unwrap(), 2);

    let out = service.query_documents("rust borrowing", 1, true).await;
    assert!(out.starts_with("Found 1 relevant documents for query: 'rust borrowing'"));
    assert!(out.contains("rust.txt"), "{}", out);
    assert!(out.contains("Chunk: 0 of 1"));
    assert!(out.contains("Similarity Score: "));
}

#[tokio::test]
async fn bootstrap_without_data_directory_still_opens_store() {
    let h = Harness::new(false);
    let service = h.service();
    assert!(service.bootstrap().await.unwrap().is_none());
    assert!(service.store().is_ready().await);
    assert_eq!(service.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn bootstrap_skips_hidden_files() {
    let h = Harness::new(true);
    write(&h.data.join(".secret.txt"), "hidden words");
    fs::create_dir_all(h.data.join(".git")).unwrap();
    write(&h.data.join(".git").join("HEAD"), "ref: refs/heads/main");
    write(&h.data.join("visible.txt"), "visible words");

    let service = h.service();
    let report = service.bootstrap().await.unwrap().unwrap();
    assert_eq!(report.files_succeeded, 1);

    let listing = service.list_ingested_files().await;
    assert!(listing.contains("visible.txt"));
    assert!(!listing.contains(".secret.txt"));
}

#[tokio::test]
async fn bootstrap_extracts_office_documents_locally() {
    let h = Harness::new(true);
    let docx = {
        let mut buf = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut buf);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("word/document.xml", opts).unwrap();
        zip.write_all(
            br#"<w:document><w:body><w:p><w:r><w:t>quarterly revenue forecast</w:t></w:r></w:p></w:body></w:document>"#,
        )
        .unwrap();
        zip.finish().unwrap();
        buf.into_inner()
    };
    fs::write(h.data.join("report.docx"), docx).unwrap();

    let service = h.service();
    let report = service.bootstrap().await.unwrap().unwrap();
    assert_eq!(report.files_succeeded, 1, "{:?}", report.failures);

    let out = service.query_documents("revenue forecast", 5, false).await;
    assert!(out.contains("quarterly revenue forecast"), "{}", out);
    assert!(!out.contains("Source:"));
}

#[tokio::test]
async fn reopened_store_keeps_records_and_skips_ingestion() {
    let h = Harness::new(true);
    write(&h.data.join("a.txt"), "persistent content");

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
    let engine: Arc<dyn VectorEngine> = Arc::new(SqliteEngine::new(embedder.clone(), 16));

    let first = RagService::with_engine(h.config(true), engine.clone()).unwrap();
    first.bootstrap().await.unwrap().unwrap();
    assert_eq!(first.store().count().await.unwrap(), 1);
    first.store().close().await;

    let mut config = h.config(true);
    config.store.reset_on_startup = false;
    let second = RagService::with_engine(config, engine).unwrap();
    assert!(second.bootstrap().await.unwrap().is_none());
    assert_eq!(second.store().count().await.unwrap(), 1);
    second.store().close().await;
}

// ============ ingest_file ============

#[tokio::test]
async fn ingest_file_reports_chunk_count() {
    let h = Harness::new(true);
    let service = h.service();
    service.bootstrap().await.unwrap();

    let path = h.scratch.join("notes.txt");
    write(&path, &long_text(100));
    let p = path.display().to_string();

    let out = service.ingest_file(&p, 200, 20).await;
    assert!(
        out.starts_with(&format!("Successfully ingested '{}' into vector database.", p)),
        "{}",
        out
    );
    let chunks: usize = out
        .trim_end_matches(" chunks.")
        .rsplit(' ')
        .next()
        .unwrap()
        .parse()
        .unwrap();
    assert!(chunks > 1);
    assert_eq!(service.store().count().await.unwrap(), chunks);

    let listing = service.list_ingested_files().await;
    assert!(listing.contains("1. notes.txt"));
    assert!(listing.contains("Ingestion method: manual"));
    assert!(listing.contains(&format!("Chunks: {}", chunks)));
}

#[tokio::test]
async fn listing_matches_chunker_for_twelve_thousand_chars() {
    let h = Harness::new(true);
    let service = h.service();
    service.bootstrap().await.unwrap();

    let text = "abcd ".repeat(2400);
    assert_eq!(text.chars().count(), 12_000);
    let path = h.scratch.join("scenario.txt");
    write(&path, &text);

    let expected = chunk_text(&text, 5000, 800).unwrap();
    assert_eq!(expected.len(), 3);
    let expected_chars: usize = expected.iter().map(|c| c.text.chars().count()).sum();

    let out = service
        .ingest_file(&path.display().to_string(), 5000, 800)
        .await;
    assert!(out.ends_with("Created 3 chunks."), "{}", out);

    let metas = service.store().scan_metadata().await.unwrap();
    assert_eq!(metas.len(), 3);
    assert!(metas.iter().all(|m| m.total_chunks == 3));
    let mut indices: Vec<usize> = metas.iter().map(|m| m.chunk_index).collect();
    indices.sort();
    assert_eq!(indices, vec![0, 1, 2]);

    let listing = service.list_ingested_files().await;
    assert!(listing.contains("   Chunks: 3\n"), "{}", listing);
    assert!(
        listing.contains(&format!(
            "   Total chunk size: {} characters\n",
            thousands(expected_chars as u128)
        )),
        "{}",
        listing
    );
    assert!(listing.contains(&format!(
        "Total content size: {} characters",
        thousands(expected_chars as u128)
    )));
}

#[tokio::test]
async fn failed_files_are_reported_as_ingestion_errors() {
    let h = Harness::new(true);
    write(&h.data.join("good.txt"), "some content");
    write(&h.data.join("blank.txt"), "   \n  ");
    let service = h.service();

    let report = service.bootstrap().await.unwrap().unwrap();
    assert_eq!(report.files_succeeded, 1);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        RagError::Ingestion { file, message } => {
            assert!(file.ends_with("blank.txt"), "{}", file);
            assert_eq!(message, "file is empty");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn ingest_file_validation_messages() {
    let h = Harness::new(true);
    let service = h.service();
    service.bootstrap().await.unwrap();

    let missing = h.scratch.join("missing.txt").display().to_string();
    assert_eq!(
        service.ingest_file(&missing, 100, 10).await,
        format!("Error: File '{}' does not exist.", missing)
    );

    let dir = h.scratch.display().to_string();
    assert_eq!(
        service.ingest_file(&dir, 100, 10).await,
        format!("Error: '{}' is not a file.", dir)
    );

    let empty = h.scratch.join("empty.txt");
    write(&empty, "");
    let empty = empty.display().to_string();
    assert_eq!(
        service.ingest_file(&empty, 100, 10).await,
        format!("Error: File '{}' is empty.", empty)
    );

    let ok = h.scratch.join("ok.txt");
    write(&ok, "content");
    let ok = ok.display().to_string();
    assert!(service.ingest_file(&ok, 0, 0).await.starts_with("Error:"));
    assert!(service.ingest_file(&ok, 100, -1).await.starts_with("Error:"));
    assert!(service.ingest_file(&ok, 100, 100).await.starts_with("Error:"));
    assert_eq!(service.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn ingest_file_without_local_parser_skips_binaries() {
    let h = Harness::new(true);
    let mut config = h.config(true);
    config.parser.provider = "none".to_string();
    let service = h.service_with(config);
    service.bootstrap().await.unwrap();

    let pdf = h.scratch.join("paper.pdf");
    fs::write(&pdf, b"%PDF-1.4 not really").unwrap();
    let p = pdf.display().to_string();
    let out = service.ingest_file(&p, 100, 10).await;
    assert!(out.starts_with(&format!("Error ingesting file '{}':", p)), "{}", out);
    assert_eq!(service.store().count().await.unwrap(), 0);
}

// ============ query_documents ============

#[tokio::test]
async fn query_without_data_directory_returns_guidance() {
    let h = Harness::new(false);
    let service = h.service();
    service.bootstrap().await.unwrap();

    let out = service.query_documents("anything", 5, true).await;
    assert!(out.starts_with("No data directory is configured"), "{}", out);
    assert!(out.contains("LLAMA_RAG_DATA_DIR"));

    let listing = service.list_ingested_files().await;
    assert_eq!(listing, out);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let h = Harness::new(true);
    let service = h.service();
    service.bootstrap().await.unwrap();
    assert_eq!(service.query_documents("", 5, true).await, EMPTY_QUERY);
    assert_eq!(service.query_documents("   ", 5, true).await, EMPTY_QUERY);
}

#[tokio::test]
async fn empty_store_has_no_results() {
    let h = Harness::new(true);
    let service = h.service();
    service.bootstrap().await.unwrap();
    assert_eq!(
        service.query_documents("anything", 5, true).await,
        "No relevant documents found for your query."
    );
    assert_eq!(service.list_ingested_files().await, NOTHING_INGESTED);
}

#[tokio::test]
async fn n_results_is_clamped() {
    let h = Harness::new(true);
    write(&h.data.join("big.txt"), &long_text(400));
    let mut config = h.config(true);
    config.chunking.chunk_size = 60;
    config.chunking.overlap = 0;
    let service = h.service_with(config);
    service.bootstrap().await.unwrap();
    assert!(service.store().count().await.unwrap() > 20);

    assert_eq!(result_blocks(&service.query_documents("word7", 100, true).await), 20);
    assert_eq!(result_blocks(&service.query_documents("word7", 0, true).await), 5);
    assert_eq!(result_blocks(&service.query_documents("word7", -3, true).await), 5);
    assert_eq!(result_blocks(&service.query_documents("word7", 3, true).await), 3);
}

#[tokio::test]
async fn scores_stay_in_unit_range() {
    let h = Harness::new(true);
    write(&h.data.join("one.txt"), "topic modelling with latent topics");
    write(&h.data.join("two.txt"), "unrelated gardening notes about tomatoes");
    let service = h.service();
    service.bootstrap().await.unwrap();

    let out = service.query_documents("topic", 3, true).await;
    assert!(result_blocks(&out) <= 3);
    let scores: Vec<f64> = out
        .lines()
        .filter_map(|l| l.strip_prefix("Similarity Score: "))
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    assert!(scores[0] >= scores[1]);
}

// ============ clear / reingest ============

#[tokio::test]
async fn clear_database_reports_removed_count() {
    let h = Harness::new(true);
    write(&h.data.join("a.txt"), "alpha");
    write(&h.data.join("b.txt"), "beta");
    let service = h.service();
    service.bootstrap().await.unwrap();

    assert_eq!(
        service.clear_database().await,
        "Successfully cleared 2 documents from the vector database."
    );
    assert_eq!(service.store().count().await.unwrap(), 0);
    assert_eq!(
        service.clear_database().await,
        "Successfully cleared 0 documents from the vector database."
    );
    assert!(service.store().is_ready().await);
}

#[tokio::test]
async fn clear_database_reports_store_errors() {
    let h = Harness::new(true);
    let service = h.service();
    let out = service.clear_database().await;
    assert!(out.starts_with("Error clearing database:"), "{}", out);
    assert!(out.contains("not open"), "{}", out);
}

#[tokio::test]
async fn reingest_picks_up_new_files_and_drops_manual_ones() {
    let h = Harness::new(true);
    write(&h.data.join("a.txt"), "alpha");
    let service = h.service();
    service.bootstrap().await.unwrap();

    let manual = h.scratch.join("manual.txt");
    write(&manual, "manually added");
    service
        .ingest_file(&manual.display().to_string(), 100, 10)
        .await;
    write(&h.data.join("b.txt"), "beta");

    assert_eq!(
        service.reingest_data_directory().await,
        "Successfully reingested data directory. Database now contains 2 documents."
    );
    let listing = service.list_ingested_files().await;
    assert!(listing.contains("a.txt"));
    assert!(listing.contains("b.txt"));
    assert!(!listing.contains("manual.txt"));
    assert!(!listing.contains("Ingestion method: manual"));
}

#[tokio::test]
async fn reingest_without_data_directory_returns_guidance() {
    let h = Harness::new(false);
    let service = h.service();
    service.bootstrap().await.unwrap();
    assert!(service
        .reingest_data_directory()
        .await
        .starts_with("No data directory is configured"));
}

// ============ status ============

#[tokio::test]
async fn status_is_stable_between_calls() {
    let h = Harness::new(true);
    write(&h.data.join("a.txt"), "alpha");
    let service = h.service();
    service.bootstrap().await.unwrap();

    let first = service.get_status().await;
    let second = service.get_status().await;
    assert_eq!(first, second);

    assert_eq!(first["status"], "active");
    assert_eq!(first["system"]["collection_ready"], true);
    assert_eq!(first["system"]["total_documents"], 1);
    assert_eq!(first["system"]["auto_ingestion_enabled"], true);
    assert_eq!(first["database"]["source"], "environment");
    assert_eq!(first["database"]["collection_name"], "rag_documents");
    assert_eq!(first["data_directory"]["exists"], true);
    assert_eq!(first["components"]["document_parser"], "local");
}

#[tokio::test]
async fn status_before_open_and_without_data_directory() {
    let h = Harness::new(false);
    let service = h.service();

    let status = service.get_status().await;
    assert_eq!(status["system"]["database_initialized"], false);
    assert_eq!(status["system"]["collection_ready"], false);
    assert_eq!(status["system"]["total_documents"], 0);
    assert_eq!(status["data_directory"]["configured"], false);
    assert_eq!(status["data_directory"]["source"], "none");
    assert!(status["data_directory"]["error"]
        .as_str()
        .unwrap()
        .contains("LLAMA_RAG_DATA_DIR"));
}

#[tokio::test]
async fn status_redacts_api_key() {
    let h = Harness::new(true);
    let mut config = h.config(true);
    config.env.parser_api_key = Some("llx-very-secret".to_string());
    let service = h.service_with(config);
    service.bootstrap().await.unwrap();

    let status = service.get_status().await;
    let key = &status["environment_variables"]["LLAMA_CLOUD_API_KEY"];
    assert_eq!(key["set"], true);
    assert_eq!(key["value"], "[REDACTED]");
    assert!(!status.to_string().contains("llx-very-secret"));
}

// ============ tools ============

#[tokio::test]
async fn tools_dispatch_to_service() {
    let h = Harness::new(true);
    write(&h.data.join("a.txt"), "alpha beta gamma");
    let service = Arc::new(h.service());
    service.bootstrap().await.unwrap();

    let registry = ToolRegistry::with_builtins();
    let ctx = ToolContext::new(service.clone());

    let query = registry.find("query_documents").unwrap();
    let out = query
        .execute(json!({ "query": "beta" }), &ctx)
        .await
        .unwrap();
    assert!(out.as_str().unwrap().starts_with("Found 1 relevant documents"));

    let status = registry.find("get_rag_status").unwrap();
    let out = status.execute(json!({}), &ctx).await.unwrap();
    assert_eq!(out["system"]["total_documents"], 1);

    let ingest = registry.find("ingest_file").unwrap();
    assert!(ingest.execute(json!({}), &ctx).await.is_err());
    assert!(ingest
        .execute(json!({ "file_path": "x", "chunk_size": "big" }), &ctx)
        .await
        .is_err());
}

#[test]
fn analysis_prompt_mentions_topic() {
    let h = Harness::new(true);
    let service = h.service();
    let text = service.analysis_prompt("supply chains");
    assert!(text.contains("supply chains"));
    assert!(text.contains("query_documents"));
}
