//! SQLite-backed [`VectorIndex`].
//!
//! Stores one row per chunk in `policy_chunks` (see [`migrate`](crate::migrate))
//! with its embedding as a little-endian f32 BLOB. Search loads the
//! domain-filtered rows and ranks them by cosine distance in Rust.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{check_batch, nearest, Candidate, VectorIndex};
use crate::embedding::{blob_to_vec, embed_one, vec_to_blob, Embedder};
use crate::models::{ChunkMetadata, Domain, RetrievedChunk};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
        }
    }
}

struct StoredRow {
    content: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn add(
        &self,
        ids: &[String],
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        check_batch(ids, texts, metadatas)?;
        let now = chrono::Utc::now().timestamp();
        let model = self.embedder.model_name().to_string();

        for start in (0..ids.len()).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(ids.len());
            let vectors = self
                .embedder
                .embed(&texts[start..end])
                .await
                .context("Failed to embed chunk batch")?;
            if vectors.len() != end - start {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    end - start
                );
            }

            let mut tx = self.pool.begin().await?;
            for (i, vector) in (start..end).zip(vectors) {
                let meta = &metadatas[i];
                sqlx::query(
                    r#"
                    INSERT INTO policy_chunks (id, domain, source, heading, content,
                                               embedding, model, dims, indexed_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        domain = excluded.domain,
                        source = excluded.source,
                        heading = excluded.heading,
                        content = excluded.content,
                        embedding = excluded.embedding,
                        model = excluded.model,
                        dims = excluded.dims,
                        indexed_at = excluded.indexed_at
                    "#,
                )
                .bind(&ids[i])
                .bind(meta.domain.as_str())
                .bind(&meta.source)
                .bind(&meta.heading)
                .bind(&texts[i])
                .bind(vec_to_blob(&vector))
                .bind(&model)
                .bind(vector.len() as i64)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }

        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        domain: Option<Domain>,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vec = embed_one(self.embedder.as_ref(), query).await?;

        let rows = match domain {
            Some(d) => {
                sqlx::query(
                    "SELECT domain, source, heading, content, embedding FROM policy_chunks \
                     WHERE domain = ? ORDER BY rowid",
                )
                .bind(d.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT domain, source, heading, content, embedding FROM policy_chunks \
                     ORDER BY rowid",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let stored = rows
            .iter()
            .map(|row| -> Result<StoredRow> {
                let domain: String = row.try_get("domain")?;
                let blob: Vec<u8> = row.try_get("embedding")?;
                Ok(StoredRow {
                    content: row.try_get("content")?,
                    metadata: ChunkMetadata {
                        domain: domain.parse()?,
                        source: row.try_get("source")?,
                        heading: row.try_get("heading")?,
                    },
                    vector: blob_to_vec(&blob),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let candidates = stored.iter().map(|r| Candidate {
            content: &r.content,
            metadata: &r.metadata,
            vector: &r.vector,
        });
        Ok(nearest(&query_vec, candidates, k))
    }

    async fn prune(&self, domain: Domain, source: &str, keep_ids: &[String]) -> Result<u64> {
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT id FROM policy_chunks WHERE domain = ? AND source = ?")
                .bind(domain.as_str())
                .bind(source)
                .fetch_all(&self.pool)
                .await?;

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in existing.iter().filter(|id| !keep_ids.contains(id)) {
            removed += sqlx::query("DELETE FROM policy_chunks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }

    async fn count(&self, domain: Option<Domain>) -> Result<u64> {
        let count: i64 = match domain {
            Some(d) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM policy_chunks WHERE domain = ?")
                    .bind(d.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM policy_chunks")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }
}
