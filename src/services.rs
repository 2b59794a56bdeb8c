//! Process-wide service construction.
//!
//! The classifier, the index, and the generator are built once, eagerly,
//! before the first request is accepted, then shared read-only behind
//! `Arc` by every request.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::classifier::DomainClassifier;
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::generator::AnswerGenerator;
use crate::index::sqlite::SqliteIndex;
use crate::index::VectorIndex;
use crate::migrate;
use crate::models::Domain;
use crate::pipeline::{ChatPipeline, PipelineTimeouts};

/// Open the SQLite index (migrating it if needed) with the configured embedder.
pub async fn open_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let embedder = create_embedder(&config.embedding)?;
    open_index_with(config, embedder).await
}

async fn open_index_with(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorIndex>> {
    let pool = db::connect(&config.db.path)
        .await
        .with_context(|| format!("Failed to open index at {}", config.db.path.display()))?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteIndex::new(
        pool,
        embedder,
        config.embedding.batch_size,
    )))
}

/// Full text of every source of `domain`, joined by a blank line.
pub fn reference_text(config: &Config, domain: Domain) -> Result<String> {
    let texts = config
        .sources_for(domain)
        .map(|s| {
            std::fs::read_to_string(&s.path)
                .with_context(|| format!("Policy file not found: {}", s.path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(texts.join("\n\n"))
}

pub async fn build_classifier(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<DomainClassifier> {
    let hr = reference_text(config, Domain::Hr)?;
    let it = reference_text(config, Domain::It)?;
    DomainClassifier::new(embedder, &hr, &it)
        .await
        .context("Failed to embed classifier reference texts")
}

/// Build every shared service handle and assemble the pipeline.
///
/// The embedder shared by the classifier and the index never retries: the
/// pipeline's deadlines are the only bound on a request.
pub async fn build_pipeline(config: &Config) -> Result<ChatPipeline> {
    let embedder = create_embedder(&config.embedding.for_queries())?;
    let index = open_index_with(config, Arc::clone(&embedder)).await?;
    let classifier = build_classifier(config, embedder).await?;
    let generator = AnswerGenerator::from_config(&config.generation)?;

    tracing::info!(
        backend = generator.backend_name(),
        model = %config.generation.model,
        embedding_model = %config.embedding.model.as_deref().unwrap_or("default"),
        "chat pipeline ready"
    );

    Ok(ChatPipeline::new(
        Arc::new(classifier),
        index,
        Arc::new(generator),
        PipelineTimeouts::from(&config.pipeline),
    ))
}
