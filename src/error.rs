//! Error taxonomy for caller-facing operations.
//!
//! Engine, embedding and parser internals use `anyhow::Result` and are
//! mapped into [`RagError::Store`] at the store adapter boundary. Per-file
//! pipeline failures become [`RagError::Ingestion`] entries in the
//! ingestion report. Directory resolution returns [`ConfigError`] directly,
//! since callers render its remediation text instead of propagating it.
//! Tool handlers never propagate any of these upward: they render them into
//! text (see [`crate::service`]).

use thiserror::Error;

/// Result alias used by the service layer.
pub type Result<T> = std::result::Result<T, RagError>;

/// A directory could not be resolved.
///
/// Recoverable: `message` is the user-facing remediation text and always
/// names the environment variable that fixes the problem.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    /// Environment variable that would resolve the problem.
    pub variable: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RagError {
    /// Rejected before any store access (empty query, bad chunk parameters).
    #[error("{0}")]
    Validation(String),

    /// A single file could not be ingested.
    #[error("Failed to ingest '{file}': {message}")]
    Ingestion { file: String, message: String },

    /// The vector engine failed or the collection is unavailable.
    #[error("{0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn ingestion(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Wrap an engine error, keeping the full `anyhow` context chain.
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }
}
