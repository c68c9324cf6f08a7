//! Caller-facing rendering of query hits, file listings and status.
//!
//! Everything here is pure: the service fetches from the store and hands
//! the rows to these functions.

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{ChunkMetadata, QueryHit};

pub const EMPTY_QUERY: &str = "Error: Query cannot be empty.";
pub const NO_RESULTS: &str = "No relevant documents found for your query.";
pub const NOTHING_INGESTED: &str = "No files have been ingested yet.";

/// Render ranked hits as numbered result blocks.
///
/// ```rust
/// use rag_server::models::QueryHit;
/// use rag_server::retrieval::format_query_results;
///
/// let hits = vec![QueryHit { id: "1".into(), text: "hello".into(), metadata: None, distance: 0.1 }];
/// let out = format_query_results("greeting", &hits, false);
/// assert!(out.starts_with("Found 1 relevant documents for query: 'greeting'"));
/// assert!(out.contains("--- Result 1 ---\nContent: hello"));
/// ```
pub fn format_query_results(query: &str, hits: &[QueryHit], include_metadata: bool) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }

    let blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut block = format!("\n--- Result {} ---\nContent: {}\n", i + 1, hit.text);
            if include_metadata {
                if let Some(meta) = &hit.metadata {
                    block.push_str(&format!("Source: {}\n", meta.source_file));
                    block.push_str(&format!(
                        "Chunk: {} of {}\n",
                        meta.chunk_index, meta.total_chunks
                    ));
                    block.push_str(&format!("Similarity Score: {:.3}\n", hit.similarity()));
                }
            }
            block
        })
        .collect();

    format!(
        "Found {} relevant documents for query: '{}'\n{}",
        hits.len(),
        query,
        blocks.join("\n")
    )
}

/// Per-file aggregate over stored chunk metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: u64,
    pub creation_date: Option<String>,
    pub last_modified_date: Option<String>,
    pub ingestion_method: String,
    pub chunks: usize,
    pub total_chunk_size: usize,
}

/// Group chunk metadata by `(file_name, file_path)`, in first-seen order.
pub fn summarize_files(metas: &[ChunkMetadata]) -> Vec<FileSummary> {
    let mut out: Vec<FileSummary> = Vec::new();
    for meta in metas {
        let idx = match out
            .iter()
            .position(|s| s.file_name == meta.file_name && s.file_path == meta.file_path)
        {
            Some(i) => i,
            None => {
                out.push(FileSummary {
                    file_name: meta.file_name.clone(),
                    file_path: meta.file_path.clone(),
                    file_type: meta.file_type.clone(),
                    file_size: meta.file_size.unwrap_or(0),
                    creation_date: meta.creation_date.clone(),
                    last_modified_date: meta.last_modified_date.clone(),
                    ingestion_method: meta.ingestion_method.to_string(),
                    chunks: 0,
                    total_chunk_size: 0,
                });
                out.len() - 1
            }
        };
        let summary = &mut out[idx];
        summary.chunks += 1;
        summary.total_chunk_size += meta.chunk_size;
    }
    out
}

pub fn format_file_list(files: &[FileSummary]) -> String {
    if files.is_empty() {
        return NOTHING_INGESTED.to_string();
    }

    let mut out = format!("Ingested Files ({} total):\n\n", files.len());
    for (i, f) in files.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, f.file_name));
        out.push_str(&format!("   Path: {}\n", f.file_path));
        out.push_str(&format!("   Type: {}\n", or_unknown(&f.file_type)));
        out.push_str(&format!("   Size: {} bytes\n", thousands(f.file_size as u128)));
        out.push_str(&format!("   Created: {}\n", or_unknown(&f.creation_date)));
        out.push_str(&format!("   Modified: {}\n", or_unknown(&f.last_modified_date)));
        out.push_str(&format!("   Chunks: {}\n", f.chunks));
        out.push_str(&format!(
            "   Total chunk size: {} characters\n",
            thousands(f.total_chunk_size as u128)
        ));
        out.push_str(&format!("   Ingestion method: {}\n\n", f.ingestion_method));
    }

    let total_chunks: usize = files.iter().map(|f| f.chunks).sum();
    let total_size: usize = files.iter().map(|f| f.total_chunk_size).sum();
    out.push_str(&format!("Total chunks in database: {}\n", total_chunks));
    out.push_str(&format!(
        "Total content size: {} characters",
        thousands(total_size as u128)
    ));
    out
}

fn or_unknown(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("Unknown")
}

/// `1234567` → `"1,234,567"`.
pub fn thousands(n: u128) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Inputs for [`status_json`], gathered by the service.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub database_initialized: bool,
    pub collection_ready: bool,
    pub total_documents: usize,
    pub engine: String,
    pub store_dir: String,
    pub store_dir_exists: bool,
    pub store_source: String,
    pub collection_name: String,
    pub data_dir: DataDirStatus,
    pub env_data_dir: Option<String>,
    pub env_db_dir: Option<String>,
    pub api_key_set: bool,
    pub parser: Option<String>,
    pub embedding_provider: String,
}

#[derive(Debug, Clone)]
pub enum DataDirStatus {
    Configured {
        path: String,
        exists: bool,
        source: String,
    },
    Missing {
        error: String,
    },
}

pub fn status_json(s: &StatusSnapshot) -> Value {
    let data_directory = match &s.data_dir {
        DataDirStatus::Configured {
            path,
            exists,
            source,
        } => json!({
            "path": path,
            "exists": exists,
            "configured": true,
            "source": source,
        }),
        DataDirStatus::Missing { error } => json!({
            "path": null,
            "exists": false,
            "configured": false,
            "error": error,
            "source": "none",
        }),
    };
    let configured = matches!(s.data_dir, DataDirStatus::Configured { .. });
    let api_key_value: Option<&str> = s.api_key_set.then_some("[REDACTED]");
    let db_dir_hint = format!(
        "$XDG_DATA_HOME/{app} or ~/.local/share/{app} (XDG standard)",
        app = crate::paths::APP_DIR_NAME
    );

    json!({
        "status": "active",
        "system": {
            "server_active": true,
            "database_initialized": s.database_initialized,
            "collection_ready": s.collection_ready,
            "total_documents": s.total_documents,
            "auto_ingestion_enabled": configured,
        },
        "database": {
            "type": s.engine,
            "directory": s.store_dir,
            "exists": s.store_dir_exists,
            "collection_name": s.collection_name,
            "source": s.store_source,
        },
        "data_directory": data_directory,
        "environment_variables": {
            "LLAMA_RAG_DATA_DIR": { "set": s.env_data_dir.is_some(), "value": s.env_data_dir },
            "LLAMA_RAG_DB_DIR": { "set": s.env_db_dir.is_some(), "value": s.env_db_dir },
            "LLAMA_CLOUD_API_KEY": { "set": s.api_key_set, "value": api_key_value },
        },
        "components": {
            "document_parser": s.parser,
            "embedding_provider": s.embedding_provider,
        },
        "configuration": {
            "data_dir_priority": [
                "LLAMA_RAG_DATA_DIR environment variable",
                "./data in current working directory",
                "Error if neither found",
            ],
            "db_dir_priority": [
                "LLAMA_RAG_DB_DIR environment variable",
                db_dir_hint,
                "Error if no home directory can be determined",
            ],
        },
    })
}

/// Status body used when the snapshot itself could not be gathered.
pub fn status_error_json(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
        "system": {
            "server_active": true,
            "database_initialized": false,
            "collection_ready": false,
            "total_documents": 0,
            "auto_ingestion_enabled": false,
        },
    })
}

/// The `rag_analysis_prompt` template text.
pub fn analysis_prompt(topic: &str) -> String {
    format!(
        "Please analyze the documents in the RAG database related to '{topic}'.\n\
         \n\
         First, query the database for relevant information about this topic, then provide:\n\
         1. A comprehensive summary of the key points\n\
         2. Any important insights or patterns you notice\n\
         3. Potential areas for further investigation\n\
         4. Sources and references from the retrieved documents\n\
         \n\
         Use the query_documents tool to search for information about '{topic}' and base your \
         analysis on the retrieved content.\n",
        topic = topic
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IngestionMethod;

    fn meta(name: &str, index: usize, total: usize, size: usize) -> ChunkMetadata {
        ChunkMetadata {
            source_file: format!("/data/{}", name),
            file_name: name.to_string(),
            file_path: format!("/data/{}", name),
            file_type: Some("text/plain".to_string()),
            file_size: Some(12_000),
            creation_date: Some("2024-01-02".to_string()),
            last_modified_date: None,
            chunk_index: index,
            total_chunks: total,
            chunk_size: size,
            ingestion_method: IngestionMethod::AutoIngest,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn query_results_with_metadata() {
        let hits = vec![
            QueryHit {
                id: "a".into(),
                text: "first".into(),
                metadata: Some(meta("a.txt", 0, 3, 5)),
                distance: 0.25,
            },
            QueryHit {
                id: "b".into(),
                text: "second".into(),
                metadata: Some(meta("b.txt", 2, 3, 6)),
                distance: 0.5,
            },
        ];
        let out = format_query_results("topic", &hits, true);
        assert_eq!(
            out,
            "Found 2 relevant documents for query: 'topic'\n\
             \n--- Result 1 ---\nContent: first\nSource: /data/a.txt\nChunk: 0 of 3\nSimilarity Score: 0.750\n\
             \n\
             \n--- Result 2 ---\nContent: second\nSource: /data/b.txt\nChunk: 2 of 3\nSimilarity Score: 0.500\n"
        );
    }

    #[test]
    fn query_results_without_metadata_omit_scores() {
        let hits = vec![QueryHit {
            id: "a".into(),
            text: "only".into(),
            metadata: Some(meta("a.txt", 0, 1, 4)),
            distance: 0.1,
        }];
        let out = format_query_results("q", &hits, false);
        assert!(!out.contains("Similarity Score"));
        assert!(!out.contains("Source:"));
        assert_eq!(format_query_results("q", &[], true), NO_RESULTS);
    }

    #[test]
    fn files_grouped_in_first_seen_order() {
        let metas = vec![
            meta("b.txt", 0, 2, 100),
            meta("a.txt", 0, 1, 40),
            meta("b.txt", 1, 2, 60),
        ];
        let files = summarize_files(&metas);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "b.txt");
        assert_eq!(files[0].chunks, 2);
        assert_eq!(files[0].total_chunk_size, 160);
        assert_eq!(files[1].chunks, 1);
    }

    #[test]
    fn file_list_rendering() {
        let files = summarize_files(&[meta("a.txt", 0, 1, 4200)]);
        let out = format_file_list(&files);
        assert!(out.starts_with("Ingested Files (1 total):\n\n1. a.txt\n   Path: /data/a.txt\n"));
        assert!(out.contains("   Size: 12,000 bytes\n"));
        assert!(out.contains("   Created: 2024-01-02\n   Modified: Unknown\n"));
        assert!(out.contains("   Total chunk size: 4,200 characters\n"));
        assert!(out.contains("   Ingestion method: auto_ingest\n\n"));
        assert!(out.ends_with("Total chunks in database: 1\nTotal content size: 4,200 characters"));
        assert_eq!(format_file_list(&[]), NOTHING_INGESTED);
    }

    #[test]
    fn status_redacts_api_key_and_reports_missing_data_dir() {
        let snapshot = StatusSnapshot {
            database_initialized: true,
            collection_ready: true,
            total_documents: 7,
            engine: "sqlite".into(),
            store_dir: "/db".into(),
            store_dir_exists: true,
            store_source: "environment".into(),
            collection_name: "rag_documents".into(),
            data_dir: DataDirStatus::Missing {
                error: "No data directory".into(),
            },
            env_data_dir: None,
            env_db_dir: Some("/db".into()),
            api_key_set: true,
            parser: Some("llamaparse".into()),
            embedding_provider: "hash".into(),
        };
        let v = status_json(&snapshot);
        assert_eq!(v["status"], "active");
        assert_eq!(v["system"]["total_documents"], 7);
        assert_eq!(v["system"]["auto_ingestion_enabled"], false);
        assert_eq!(v["data_directory"]["configured"], false);
        assert_eq!(v["data_directory"]["source"], "none");
        assert!(v["data_directory"]["path"].is_null());
        assert_eq!(v["environment_variables"]["LLAMA_CLOUD_API_KEY"]["value"], "[REDACTED]");
        assert_eq!(v["environment_variables"]["LLAMA_RAG_DB_DIR"]["set"], true);
        assert_eq!(v["database"]["source"], "environment");
    }

    #[test]
    fn prompt_mentions_topic_and_tool() {
        let p = analysis_prompt("supply chains");
        assert!(p.starts_with("Please analyze the documents in the RAG database related to 'supply chains'."));
        assert!(p.contains("4. Sources and references from the retrieved documents"));
        assert!(p.contains("Use the query_documents tool to search for information about 'supply chains'"));
    }
}
