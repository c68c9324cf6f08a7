//! SQLite-backed [`VectorEngine`].
//!
//! Persists every collection in a single `vectors.sqlite` file inside the
//! store directory:
//!
//! ```text
//! collections(name PRIMARY KEY, created_at)
//! records(id PRIMARY KEY, collection, document, metadata_json, embedding BLOB, dims)
//! ```
//!
//! Documents are embedded on upsert with the configured [`Embedder`] and
//! stored as little-endian `f32` BLOBs. Queries are brute-force cosine
//! distance over the collection, which is adequate for the corpus sizes a
//! single-user document folder produces.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;

use crate::embedding::{blob_to_vec, normalized_distance, vec_to_blob, Embedder};
use crate::models::{ChunkMetadata, ChunkRecord, QueryHit};

use super::{UpsertOutcome, VectorEngine, VectorStore};

/// File name of the database inside the store directory.
pub const DB_FILE_NAME: &str = "vectors.sqlite";

pub struct SqliteEngine {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl SqliteEngine {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl VectorEngine for SqliteEngine {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn open(&self, dir: &Path) -> Result<Arc<dyn VectorStore>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        let db_path = dir.join(DB_FILE_NAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", db_path.display()))?;

        migrate(&pool).await?;

        Ok(Arc::new(SqliteStore {
            pool,
            embedder: Arc::clone(&self.embedder),
            batch_size: self.batch_size,
        }))
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
        .execute(pool)
        .await?;

    Ok(())
}

/// A pooled connection to one `vectors.sqlite` file.
pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl SqliteStore {
    async fn require_collection(&self, name: &str) -> Result<()> {
        if !self.has_collection(name).await? {
            bail!("collection '{}' does not exist", name);
        }
        Ok(())
    }

    async fn insert_one(&self, name: &str, record: &ChunkRecord, vector: &[f32]) -> Result<()> {
        let metadata_json = serde_json::to_string(&record.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO records (id, collection, document, metadata_json, embedding, dims)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                collection = excluded.collection,
                document = excluded.document,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding,
                dims = excluded.dims
            "#,
        )
        .bind(&record.id)
        .bind(name)
        .bind(&record.text)
        .bind(&metadata_json)
        .bind(vec_to_blob(vector))
        .bind(vector.len() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn upsert(&self, name: &str, records: &[ChunkRecord]) -> Result<UpsertOutcome> {
        self.require_collection(name).await?;

        let mut outcome = UpsertOutcome::default();

        for batch in records.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(v) if v.len() == batch.len() => v,
                Ok(v) => {
                    let msg = format!(
                        "embedder returned {} vectors for {} texts",
                        v.len(),
                        batch.len()
                    );
                    outcome
                        .failed
                        .extend(batch.iter().map(|r| (r.id.clone(), msg.clone())));
                    continue;
                }
                Err(e) => {
                    let msg = format!("embedding failed: {:#}", e);
                    outcome
                        .failed
                        .extend(batch.iter().map(|r| (r.id.clone(), msg.clone())));
                    continue;
                }
            };

            for (record, vector) in batch.iter().zip(vectors.iter()) {
                if record.text.trim().is_empty() {
                    outcome
                        .failed
                        .push((record.id.clone(), "document text is empty".to_string()));
                    continue;
                }
                match self.insert_one(name, record, vector).await {
                    Ok(()) => outcome.inserted += 1,
                    Err(e) => outcome.failed.push((record.id.clone(), format!("{:#}", e))),
                }
            }
        }

        Ok(outcome)
    }

    async fn query(&self, name: &str, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        self.require_collection(name).await?;

        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .context("Failed to embed query")?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                QueryHit {
                    id: row.get("id"),
                    text: row.get("document"),
                    metadata: serde_json::from_str(&metadata_json).ok(),
                    distance: normalized_distance(&query_vec, &blob_to_vec(&blob)),
                }
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
        self.require_collection(name).await?;

        let rows = sqlx::query(
            "SELECT id, metadata_json FROM records WHERE collection = ? ORDER BY rowid",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.get("metadata_json");
            match serde_json::from_str::<ChunkMetadata>(&json) {
                Ok(meta) => out.push(meta),
                Err(e) => {
                    let id: String = row.get("id");
                    tracing::warn!(%id, error = %e, "skipping record with unreadable metadata");
                }
            }
        }
        Ok(out)
    }

    async fn count(&self, name: &str) -> Result<usize> {
        self.require_collection(name).await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
