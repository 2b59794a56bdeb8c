//! In-memory [`VectorIndex`] for tests and one-off runs.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`, kept in insertion
//! order. Search is brute-force cosine over all stored vectors.

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{check_batch, nearest, Candidate, VectorIndex};
use crate::embedding::{embed_one, Embedder};
use crate::models::{ChunkMetadata, Domain, RetrievedChunk};

struct StoredEntry {
    id: String,
    content: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl MemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn add(
        &self,
        ids: &[String],
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        check_batch(ids, texts, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                texts.len()
            );
        }

        let mut entries = self.entries.write().map_err(poisoned)?;
        for (((id, text), metadata), vector) in ids.iter().zip(texts).zip(metadatas).zip(vectors) {
            let entry = StoredEntry {
                id: id.clone(),
                content: text.clone(),
                metadata: metadata.clone(),
                vector,
            };
            match entries.iter_mut().find(|e| e.id == *id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
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

        let entries = self.entries.read().map_err(poisoned)?;
        let candidates = entries
            .iter()
            .filter(|e| domain.map_or(true, |d| e.metadata.domain == d))
            .map(|e| Candidate {
                content: &e.content,
                metadata: &e.metadata,
                vector: &e.vector,
            });
        Ok(nearest(&query_vec, candidates, k))
    }

    async fn prune(&self, domain: Domain, source: &str, keep_ids: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|e| {
            e.metadata.domain != domain || e.metadata.source != source || keep_ids.contains(&e.id)
        });
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self, domain: Option<Domain>) -> Result<u64> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .filter(|e| domain.map_or(true, |d| e.metadata.domain == d))
            .count() as u64)
    }
}
