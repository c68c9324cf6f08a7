//! Core data types that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RagError;

/// How a chunk entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMethod {
    /// Via the `ingest_file` tool.
    Manual,
    /// Via the startup scan or `reingest_data_directory`.
    AutoIngest,
}

impl fmt::Display for IngestionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionMethod::Manual => f.write_str("manual"),
            IngestionMethod::AutoIngest => f.write_str("auto_ingest"),
        }
    }
}

/// Metadata stored alongside every chunk.
///
/// Keys a parser returns beyond the known schema are kept in `extra` and
/// flattened into the stored JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Length of the chunk text in characters.
    pub chunk_size: usize,
    pub ingestion_method: IngestionMethod,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A chunk ready to be handed to the store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// UUID v4, independent of content.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One ranked hit returned by a similarity query.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: Option<ChunkMetadata>,
    /// Normalized distance in `[0, 1]`; 0 is identical.
    pub distance: f64,
}

impl QueryHit {
    /// Display-only similarity, `1 - distance`.
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Result of ingesting a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Ingested { file: String, chunks: usize },
    Skipped { file: String, reason: String },
    /// Nothing but whitespace after decoding or parsing.
    Empty { file: String },
    Failed { file: String, error: String },
}

impl FileOutcome {
    /// The ingestion error for a failed or empty file.
    pub fn error(&self) -> Option<RagError> {
        match self {
            FileOutcome::Empty { file } => Some(RagError::ingestion(file, "file is empty")),
            FileOutcome::Failed { file, error } => Some(RagError::ingestion(file, error)),
            FileOutcome::Ingested { .. } | FileOutcome::Skipped { .. } => None,
        }
    }
}

/// Summary of one ingestion pass over a directory.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub total_chunks: usize,
    /// One [`RagError::Ingestion`] per failed file.
    pub failures: Vec<RagError>,
}

impl IngestionReport {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Ingested { chunks, .. } => {
                self.files_succeeded += 1;
                self.total_chunks += chunks;
            }
            FileOutcome::Skipped { .. } => self.files_skipped += 1,
            FileOutcome::Empty { .. } | FileOutcome::Failed { .. } => {
                self.files_failed += 1;
                self.failures.extend(outcome.error());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ChunkMetadata {
        ChunkMetadata {
            source_file: "/docs/a.txt".to_string(),
            file_name: "a.txt".to_string(),
            file_path: "/docs/a.txt".to_string(),
            file_type: Some("text/plain".to_string()),
            file_size: Some(42),
            creation_date: None,
            last_modified_date: Some("2024-05-01".to_string()),
            chunk_index: 0,
            total_chunks: 1,
            chunk_size: 42,
            ingestion_method: IngestionMethod::AutoIngest,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn metadata_serializes_flat_with_snake_case_method() {
        let mut meta = sample_metadata();
        meta.extra
            .insert("page_count".to_string(), serde_json::json!(3));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["ingestion_method"], "auto_ingest");
        assert_eq!(json["page_count"], 3);
        assert!(json.get("creation_date").is_none());

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = IngestionReport::default();
        report.record(&FileOutcome::Ingested {
            file: "a".into(),
            chunks: 3,
        });
        report.record(&FileOutcome::Skipped {
            file: "b.pdf".into(),
            reason: "no parser".into(),
        });
        report.record(&FileOutcome::Failed {
            file: "c".into(),
            error: "store rejected".into(),
        });
        report.record(&FileOutcome::Empty { file: "d".into() });
        assert_eq!(report.files_succeeded, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_failed, 2);
        assert_eq!(report.total_chunks, 3);
        let failures: Vec<String> = report.failures.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            failures,
            vec![
                "Failed to ingest 'c': store rejected".to_string(),
                "Failed to ingest 'd': file is empty".to_string(),
            ]
        );
        assert!(report
            .failures
            .iter()
            .all(|e| matches!(e, RagError::Ingestion { .. })));
    }
}
