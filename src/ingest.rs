//! Offline ingestion: policy files → chunks → vector index.
//!
//! Each configured `[[sources]]` file is read in full, chunked with the
//! heading-scoped windowing in [`chunk`](crate::chunk), and upserted under
//! content-addressed ids. Re-ingesting unchanged text rewrites the same
//! rows. With `prune`, rows of an ingested source whose ids were not
//! produced this run (stale content) are deleted.

use anyhow::{bail, Context, Result};

use crate::chunk::chunk_document;
use crate::config::{ChunkingConfig, Config};
use crate::index::VectorIndex;
use crate::models::PolicyDocument;
use crate::services;

/// Counts reported after an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks_written: usize,
    pub pruned: u64,
}

/// Read every configured source. A missing file aborts the run.
pub fn load_documents(config: &Config) -> Result<Vec<PolicyDocument>> {
    config
        .sources
        .iter()
        .map(|source| {
            if !source.path.exists() {
                bail!("Policy file not found: {}", source.path.display());
            }
            let text = std::fs::read_to_string(&source.path)
                .with_context(|| format!("Failed to read {}", source.path.display()))?;
            Ok(PolicyDocument {
                domain: source.domain,
                path: source.path.clone(),
                text,
            })
        })
        .collect()
}

/// Chunk and upsert `documents` into `index`.
pub async fn ingest_documents(
    index: &dyn VectorIndex,
    documents: &[PolicyDocument],
    chunking: &ChunkingConfig,
    prune: bool,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for doc in documents {
        let chunks = chunk_document(doc, chunking.max_chars, chunking.overlap_chars);
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let metadatas: Vec<_> = chunks.iter().map(|c| c.metadata()).collect();

        index
            .add(&ids, &texts, &metadatas)
            .await
            .with_context(|| format!("Failed to index {}", doc.path.display()))?;

        if prune {
            report.pruned += index.prune(doc.domain, &doc.source_name(), &ids).await?;
        }

        tracing::debug!(
            source = %doc.source_name(),
            domain = %doc.domain,
            chunks = chunks.len(),
            "indexed policy document"
        );
        report.documents += 1;
        report.chunks_written += chunks.len();
    }

    Ok(report)
}

/// The `ingest` command.
pub async fn run_ingest(config: &Config, dry_run: bool, prune: bool) -> Result<()> {
    let documents = load_documents(config)?;

    if dry_run {
        println!("ingest (dry-run)");
        println!("  documents found: {}", documents.len());
        for doc in &documents {
            let chunks = chunk_document(
                doc,
                config.chunking.max_chars,
                config.chunking.overlap_chars,
            );
            println!(
                "  {} [{}]: {} chunks",
                doc.path.display(),
                doc.domain,
                chunks.len()
            );
        }
        return Ok(());
    }

    let index = services::open_index(config).await?;
    let report = ingest_documents(index.as_ref(), &documents, &config.chunking, prune).await?;

    println!("ingest");
    println!("  documents: {}", report.documents);
    println!("  chunks written: {}", report.chunks_written);
    if prune {
        println!("  stale chunks pruned: {}", report.pruned);
    }
    println!("  indexed total: {}", index.count(None).await?);
    println!("ok");

    Ok(())
}
