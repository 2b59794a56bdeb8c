//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the storage seam between ingestion and the
//! query pipeline. Implementations persist chunk embeddings with their
//! [`ChunkMetadata`] and answer nearest-neighbor queries, optionally
//! restricted to one [`Domain`].
//!
//! | Implementation | Backing store |
//! |----------------|---------------|
//! | [`SqliteIndex`](sqlite::SqliteIndex) | `policy_chunks` table via sqlx |
//! | [`MemoryIndex`](memory::MemoryIndex) | `Vec` behind a `RwLock` (tests) |
//!
//! Both compute embeddings with an injected [`Embedder`](crate::embedding::Embedder)
//! and rank by cosine distance (`1 - cosine similarity`). Results come back
//! in ascending distance order with `score = 1 - distance`; the index never
//! deduplicates.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, Domain, RetrievedChunk};

/// Abstract nearest-neighbor store for policy chunks.
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// concurrent request.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent upsert. Re-adding an existing id replaces its content,
    /// metadata and embedding. The three slices must have equal length.
    async fn add(&self, ids: &[String], texts: &[String], metadatas: &[ChunkMetadata])
        -> Result<()>;

    /// Up to `k` entries nearest to `query`, ascending distance, restricted
    /// to `domain` when given.
    async fn search(
        &self,
        query: &str,
        k: usize,
        domain: Option<Domain>,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Delete entries of `source` within `domain` whose id is not in
    /// `keep_ids`. Returns the number of rows removed.
    async fn prune(&self, domain: Domain, source: &str, keep_ids: &[String]) -> Result<u64>;

    /// Number of stored entries, optionally for one domain.
    async fn count(&self, domain: Option<Domain>) -> Result<u64>;
}

pub(crate) fn check_batch(ids: &[String], texts: &[String], metadatas: &[ChunkMetadata]) -> Result<()> {
    if ids.len() != texts.len() || ids.len() != metadatas.len() {
        bail!(
            "add() requires equal-length inputs: {} ids, {} texts, {} metadatas",
            ids.len(),
            texts.len(),
            metadatas.len()
        );
    }
    Ok(())
}

/// A stored entry as seen by the ranking step.
pub(crate) struct Candidate<'a> {
    pub content: &'a str,
    pub metadata: &'a ChunkMetadata,
    pub vector: &'a [f32],
}

/// Rank candidates by cosine distance to `query_vec` and keep the `k` nearest.
///
/// Ties keep their storage order.
pub(crate) fn nearest<'a>(
    query_vec: &[f32],
    candidates: impl IntoIterator<Item = Candidate<'a>>,
    k: usize,
) -> Vec<RetrievedChunk> {
    let mut scored: Vec<(f64, Candidate<'a>)> = candidates
        .into_iter()
        .map(|c| {
            let distance = 1.0 - cosine_similarity(query_vec, c.vector) as f64;
            (distance, c)
        })
        .collect();

    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(distance, c)| RetrievedChunk {
            content: c.content.to_string(),
            metadata: c.metadata.clone(),
            score: 1.0 - distance,
        })
        .collect()
}
