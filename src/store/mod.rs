//! Vector store abstraction and the adapter the service talks to.
//!
//! Two traits separate *how vectors are kept* from *how the service uses
//! them*:
//!
//! - [`VectorEngine`] opens a [`VectorStore`] client rooted at a directory.
//! - [`VectorStore`] is the client: named collections of records that embed
//!   their own documents and answer nearest-neighbour queries.
//!
//! [`StoreAdapter`] owns the store directory and the single active client.
//! Destructive operations take the write side of its lock, so they never
//! interleave with a query or an upsert.
//!
//! # Implementations
//!
//! | Engine | Module | Persistence |
//! |--------|--------|-------------|
//! | [`SqliteEngine`] | [`sqlite`] | `vectors.sqlite` under the store directory |
//! | [`MemoryEngine`] | [`memory`] | none (process-local) |

pub mod memory;
pub mod sqlite;

pub use memory::MemoryEngine;
pub use sqlite::SqliteEngine;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::models::{ChunkMetadata, ChunkRecord, QueryHit};

/// Result of a batch upsert. Records that failed are reported individually
/// and never abort the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: usize,
    /// `(record id, error)` pairs.
    pub failed: Vec<(String, String)>,
}

/// Client for one opened store directory.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` if it does not exist. Idempotent.
    async fn create_collection(&self, name: &str) -> AnyResult<()>;
    /// Drop `name` and every record in it. Dropping a missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> AnyResult<()>;
    async fn has_collection(&self, name: &str) -> AnyResult<bool>;
    /// Embed and insert (or replace, by id) each record.
    async fn upsert(&self, name: &str, records: &[ChunkRecord]) -> AnyResult<UpsertOutcome>;
    /// Up to `k` records ordered by ascending normalized distance to `text`.
    async fn query(&self, name: &str, text: &str, k: usize) -> AnyResult<Vec<QueryHit>>;
    /// Metadata of every record, in insertion order.
    async fn scan_metadata(&self, name: &str) -> AnyResult<Vec<ChunkMetadata>>;
    async fn count(&self, name: &str) -> AnyResult<usize>;
    /// Release handles on the directory. The client must not be used afterwards.
    async fn close(&self) {}
}

/// Factory for [`VectorStore`] clients.
#[async_trait]
pub trait VectorEngine: Send + Sync {
    /// Short identifier reported in the status snapshot (e.g. `"sqlite"`).
    fn kind(&self) -> &'static str;
    async fn open(&self, dir: &Path) -> AnyResult<Arc<dyn VectorStore>>;
}

/// The service's handle on the single active collection.
pub struct StoreAdapter {
    engine: Arc<dyn VectorEngine>,
    dir: PathBuf,
    collection: String,
    client: RwLock<Option<Arc<dyn VectorStore>>>,
}

impl StoreAdapter {
    pub fn new(engine: Arc<dyn VectorEngine>, dir: PathBuf, collection: impl Into<String>) -> Self {
        Self {
            engine,
            dir,
            collection: collection.into(),
            client: RwLock::new(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn engine_kind(&self) -> &'static str {
        self.engine.kind()
    }

    /// Close the client, wipe the store directory, and start over with an
    /// empty collection.
    pub async fn reset_and_create(&self) -> Result<()> {
        let mut guard = self.client.write().await;
        if let Some(old) = guard.take() {
            old.close().await;
        }

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let client = self.engine.open(&self.dir).await.map_err(RagError::store)?;
        client
            .create_collection(&self.collection)
            .await
            .map_err(RagError::store)?;
        *guard = Some(client);

        tracing::info!(dir = %self.dir.display(), collection = %self.collection, "store reset");
        Ok(())
    }

    /// Open the existing store directory, creating the collection only if missing.
    pub async fn open_or_create(&self) -> Result<()> {
        let mut guard = self.client.write().await;
        if guard.is_some() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let client = self.engine.open(&self.dir).await.map_err(RagError::store)?;
        client
            .create_collection(&self.collection)
            .await
            .map_err(RagError::store)?;
        *guard = Some(client);

        tracing::debug!(dir = %self.dir.display(), "store opened");
        Ok(())
    }

    pub async fn create_collection(&self) -> Result<()> {
        let guard = self.client.write().await;
        let client = open_client(&guard)?;
        client
            .create_collection(&self.collection)
            .await
            .map_err(RagError::store)
    }

    pub async fn delete_collection(&self) -> Result<()> {
        let guard = self.client.write().await;
        let client = open_client(&guard)?;
        client
            .delete_collection(&self.collection)
            .await
            .map_err(RagError::store)
    }

    /// Drop and recreate the collection under one write lock.
    pub async fn recreate_collection(&self) -> Result<()> {
        let guard = self.client.write().await;
        let client = open_client(&guard)?;
        client
            .delete_collection(&self.collection)
            .await
            .map_err(RagError::store)?;
        client
            .create_collection(&self.collection)
            .await
            .map_err(RagError::store)
    }

    pub async fn upsert(&self, records: &[ChunkRecord]) -> Result<UpsertOutcome> {
        if records.is_empty() {
            return Ok(UpsertOutcome::default());
        }
        let guard = self.client.read().await;
        let client = open_client(&guard)?;
        let outcome = client
            .upsert(&self.collection, records)
            .await
            .map_err(RagError::store)?;
        for (id, err) in &outcome.failed {
            tracing::warn!(%id, error = %err, "record rejected by store");
        }
        Ok(outcome)
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        let guard = self.client.read().await;
        let client = open_client(&guard)?;
        client
            .query(&self.collection, text, k)
            .await
            .map_err(RagError::store)
    }

    pub async fn scan_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let guard = self.client.read().await;
        let client = open_client(&guard)?;
        client
            .scan_metadata(&self.collection)
            .await
            .map_err(RagError::store)
    }

    pub async fn count(&self) -> Result<usize> {
        let guard = self.client.read().await;
        let client = open_client(&guard)?;
        client.count(&self.collection).await.map_err(RagError::store)
    }

    /// A client is open and the collection exists.
    pub async fn is_ready(&self) -> bool {
        let guard = self.client.read().await;
        match guard.as_ref() {
            Some(client) => client
                .has_collection(&self.collection)
                .await
                .unwrap_or(false),
            None => false,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Close the client if one is open. Later operations fail until the
    /// store is opened again.
    pub async fn close(&self) {
        if let Some(client) = self.client.write().await.take() {
            client.close().await;
        }
    }
}

fn open_client(slot: &Option<Arc<dyn VectorStore>>) -> Result<&Arc<dyn VectorStore>> {
    slot.as_ref()
        .ok_or_else(|| RagError::Store("vector store is not open".to_string()))
}
