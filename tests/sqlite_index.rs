//! SQLite vector index: domain filtering, scoring, idempotent upsert, pruning.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use policy_assistant::config::ChunkingConfig;
use policy_assistant::db;
use policy_assistant::embedding::{cosine_similarity, Embedder};
use policy_assistant::index::memory::MemoryIndex;
use policy_assistant::index::sqlite::SqliteIndex;
use policy_assistant::index::VectorIndex;
use policy_assistant::ingest::ingest_documents;
use policy_assistant::migrate;
use policy_assistant::models::{ChunkMetadata, Domain, PolicyDocument};
use tempfile::TempDir;

async fn open(tmp: &TempDir) -> SqliteIndex {
    let pool = db::connect(&tmp.path().join("data/policy.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    SqliteIndex::new(pool, Arc::new(AxisEmbedder), 3)
}

async fn ingest(index: &SqliteIndex, docs: &[PolicyDocument], prune: bool) -> u64 {
    ingest_documents(index, docs, &ChunkingConfig::default(), prune)
        .await
        .unwrap()
        .pruned
}

#[tokio::test]
async fn test_domain_filter_returns_only_that_domain() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    ingest(&index, &policy_documents(), false).await;

    let hits = index.search("leave vpn password", 6, Some(Domain::Hr)).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.metadata.domain == Domain::Hr));

    let hits = index.search("leave vpn password", 6, Some(Domain::It)).await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.metadata.domain == Domain::It));

    let all = index.search("leave vpn password", 20, None).await.unwrap();
    assert_eq!(all.len(), 8);
}

#[tokio::test]
async fn test_score_is_one_minus_cosine_distance() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    ingest(&index, &policy_documents(), false).await;

    let query = "sick leave";
    let hits = index.search(query, 6, Some(Domain::Hr)).await.unwrap();
    let q = axis_vector(query);
    for h in &hits {
        let distance = 1.0 - cosine_similarity(&q, &axis_vector(&h.content)) as f64;
        assert!((h.score - (1.0 - distance)).abs() < 1e-9);
    }
    // Ascending distance.
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(hits[0].metadata.heading, "Sick Leave");
}

#[tokio::test]
async fn test_search_respects_k() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    ingest(&index, &policy_documents(), false).await;

    let hits = index.search("leave", 2, Some(Domain::Hr)).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;

    ingest(&index, &policy_documents(), false).await;
    let first = index.count(None).await.unwrap();
    ingest(&index, &policy_documents(), false).await;

    assert_eq!(first, 8);
    assert_eq!(index.count(None).await.unwrap(), first);
    assert_eq!(index.count(Some(Domain::Hr)).await.unwrap(), 4);
}

#[tokio::test]
async fn test_upsert_replaces_content_and_metadata() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let meta = |heading: &str| ChunkMetadata {
        domain: Domain::It,
        source: "it_policy.md".to_string(),
        heading: heading.to_string(),
    };

    index
        .add(&["IT-x-1".to_string()], &["old vpn text".to_string()], &[meta("Old")])
        .await
        .unwrap();
    index
        .add(&["IT-x-1".to_string()], &["new vpn text".to_string()], &[meta("New")])
        .await
        .unwrap();

    let hits = index.search("vpn", 6, Some(Domain::It)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "new vpn text");
    assert_eq!(hits[0].metadata.heading, "New");
}

#[tokio::test]
async fn test_changed_content_orphans_until_pruned() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    ingest(&index, &policy_documents(), false).await;

    let mut docs = policy_documents();
    docs[0].text = docs[0].text.replace("20 days", "25 days");

    // Without pruning the old "Annual Leave" chunk stays alongside the new one.
    assert_eq!(ingest(&index, &docs, false).await, 0);
    assert_eq!(index.count(Some(Domain::Hr)).await.unwrap(), 5);

    assert_eq!(ingest(&index, &docs, true).await, 1);
    assert_eq!(index.count(Some(Domain::Hr)).await.unwrap(), 4);
    assert_eq!(index.count(Some(Domain::It)).await.unwrap(), 4);

    let hits = index.search("annual leave", 1, Some(Domain::Hr)).await.unwrap();
    assert!(hits[0].content.contains("25 days"));
}

#[tokio::test]
async fn test_add_rejects_mismatched_lengths() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let err = index
        .add(&["a".to_string(), "b".to_string()], &["t".to_string()], &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("equal-length"));
}

fn same_named_documents() -> Vec<PolicyDocument> {
    let mut docs = policy_documents();
    docs[0].path = "hr/policy.md".into();
    docs[1].path = "it/policy.md".into();
    docs
}

#[tokio::test]
async fn test_prune_leaves_same_named_source_of_other_domain() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let docs = same_named_documents();

    assert_eq!(ingest(&index, &docs, true).await, 0);
    assert_eq!(ingest(&index, &docs, true).await, 0);
    assert_eq!(index.count(Some(Domain::Hr)).await.unwrap(), 4);
    assert_eq!(index.count(Some(Domain::It)).await.unwrap(), 4);
}

#[tokio::test]
async fn test_memory_prune_is_scoped_to_domain() {
    let index = MemoryIndex::new(Arc::new(AxisEmbedder));
    let report = ingest_documents(&index, &same_named_documents(), &ChunkingConfig::default(), true)
        .await
        .unwrap();

    assert_eq!(report.chunks_written, 8);
    assert_eq!(report.pruned, 0);
    assert_eq!(index.count(Some(Domain::Hr)).await.unwrap(), 4);
    assert_eq!(index.count(Some(Domain::It)).await.unwrap(), 4);
}

/// Drops the last vector of every batch.
struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    fn model_name(&self) -> &str {
        "short"
    }
    fn dims(&self) -> usize {
        AXES.len()
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| axis_vector(t)).collect();
        vectors.pop();
        Ok(vectors)
    }
}

#[tokio::test]
async fn test_add_fails_when_embedder_returns_too_few_vectors() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("short.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let sqlite = SqliteIndex::new(pool, Arc::new(ShortEmbedder), 3);
    let memory = MemoryIndex::new(Arc::new(ShortEmbedder));

    let err = ingest_documents(&sqlite, &policy_documents(), &ChunkingConfig::default(), false)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("vectors for 3 chunks"));
    assert_eq!(sqlite.count(None).await.unwrap(), 0);

    let err = ingest_documents(&memory, &policy_documents(), &ChunkingConfig::default(), false)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("vectors for 4 chunks"));
    assert_eq!(memory.count(None).await.unwrap(), 0);
}
