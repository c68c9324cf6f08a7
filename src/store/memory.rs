//! In-memory [`VectorEngine`] for tests and ephemeral runs.
//!
//! Records live in a `HashMap` of collections behind `std::sync::RwLock`.
//! Search is brute-force cosine distance over every record. Nothing is
//! written to the store directory, so every [`open`](VectorEngine::open)
//! starts empty.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::{normalized_distance, Embedder};
use crate::models::{ChunkMetadata, ChunkRecord, QueryHit};

use super::{UpsertOutcome, VectorEngine, VectorStore};

pub struct MemoryEngine {
    embedder: Arc<dyn Embedder>,
}

impl MemoryEngine {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl VectorEngine for MemoryEngine {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, _dir: &Path) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(MemoryStore {
            embedder: Arc::clone(&self.embedder),
            collections: RwLock::new(HashMap::new()),
        }))
    }
}

struct StoredRecord {
    id: String,
    text: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Vec<StoredRecord>>>,
}

impl MemoryStore {
    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<StoredRecord>>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<StoredRecord>>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        self.write()?.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.write()?.remove(name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(name))
    }

    async fn upsert(&self, name: &str, records: &[ChunkRecord]) -> Result<UpsertOutcome> {
        if !self.has_collection(name).await? {
            bail!("collection '{}' does not exist", name);
        }

        let mut outcome = UpsertOutcome::default();
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = match self.embedder.embed(&texts).await {
            Ok(v) if v.len() == records.len() => v,
            Ok(v) => {
                let msg = format!("embedder returned {} vectors for {} texts", v.len(), records.len());
                outcome.failed = records.iter().map(|r| (r.id.clone(), msg.clone())).collect();
                return Ok(outcome);
            }
            Err(e) => {
                let msg = format!("{:#}", e);
                outcome.failed = records.iter().map(|r| (r.id.clone(), msg.clone())).collect();
                return Ok(outcome);
            }
        };

        let mut collections = self.write()?;
        let stored = collections
            .get_mut(name)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))?;

        for (record, vector) in records.iter().zip(vectors) {
            if record.text.trim().is_empty() {
                outcome
                    .failed
                    .push((record.id.clone(), "document text is empty".to_string()));
                continue;
            }
            stored.retain(|r| r.id != record.id);
            stored.push(StoredRecord {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                vector,
            });
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    async fn query(&self, name: &str, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        if !self.has_collection(name).await? {
            bail!("collection '{}' does not exist", name);
        }
        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let collections = self.read()?;
        let stored = collections
            .get(name)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))?;

        let mut hits: Vec<QueryHit> = stored
            .iter()
            .map(|r| QueryHit {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: Some(r.metadata.clone()),
                distance: normalized_distance(&query_vec, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn scan_metadata(&self, name: &str) -> Result<Vec<ChunkMetadata>> {
        let collections = self.read()?;
        let stored = collections
            .get(name)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))?;
        Ok(stored.iter().map(|r| r.metadata.clone()).collect())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let collections = self.read()?;
        let stored = collections
            .get(name)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", name))?;
        Ok(stored.len())
    }
}
