//! Per-request orchestration: validate → classify → retrieve → score gate →
//! dedup & rank → generate → respond.
//!
//! Every stage may end the request early. Low classification confidence,
//! an empty result set, or a weak best match end it with a clarification
//! (a normal [`ChatAnswer`]); a failing or slow backend ends it with
//! [`ChatError::ServiceUnavailable`]. There is no partial-answer path.
//!
//! Classification, retrieval and generation each run as their own tokio
//! task under a deadline (classification reuses the retrieval one), so a
//! slow backend call never blocks other requests. A call that misses its
//! deadline is aborted and not retried.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::classifier::DomainClassifier;
use crate::config::PipelineConfig;
use crate::error::{ChatError, Stage};
use crate::generator::AnswerGenerator;
use crate::identity::CallerIdentity;
use crate::index::VectorIndex;
use crate::logging::{log_answer, AnswerRecord};
use crate::models::{ChatAnswer, Citation, RetrievedChunk};

pub const MIN_CLASSIFICATION_CONFIDENCE: f64 = 0.55;
pub const MIN_TOP_SCORE: f64 = 0.3;
pub const RETRIEVAL_K: usize = 6;
pub const MAX_CONTEXT_CHUNKS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 500;
pub const SNIPPET_CHARS: usize = 200;
pub const DEDUP_PREFIX_CHARS: usize = 120;

pub const CLARIFY_DOMAIN: &str = "Is your question about HR policy (leave, payroll, benefits) \
or IT policy (accounts, devices, security)?";
pub const CLARIFY_NO_RESULTS: &str =
    "I couldn't find relevant policy content. Could you rephrase or add details?";
pub const CLARIFY_WEAK_MATCHES: &str =
    "I found only weak matches. Can you clarify what exactly you need?";

#[derive(Debug, Clone, Copy)]
pub struct PipelineTimeouts {
    pub retrieval: Duration,
    pub generation: Duration,
}

impl From<&PipelineConfig> for PipelineTimeouts {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            retrieval: config.retrieval_timeout(),
            generation: config.generation_timeout(),
        }
    }
}

/// Per-request context supplied by the caller's boundary (HTTP or CLI).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub caller: CallerIdentity,
}

impl RequestContext {
    /// A context with a fresh UUID request id.
    pub fn new(caller: CallerIdentity) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            caller,
        }
    }
}

/// The shared, read-only service handles plus deadlines. Built once per
/// process; `answer` takes `&self` and keeps no state between requests.
pub struct ChatPipeline {
    classifier: Arc<DomainClassifier>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<AnswerGenerator>,
    timeouts: PipelineTimeouts,
}

impl ChatPipeline {
    pub fn new(
        classifier: Arc<DomainClassifier>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<AnswerGenerator>,
        timeouts: PipelineTimeouts,
    ) -> Self {
        Self {
            classifier,
            index,
            generator,
            timeouts,
        }
    }

    pub async fn answer(
        &self,
        ctx: &RequestContext,
        question: &str,
    ) -> Result<ChatAnswer, ChatError> {
        let q = validate_question(question)?;
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        // The embedding stage shares the retrieval deadline.
        let classifier = Arc::clone(&self.classifier);
        let query = q.to_string();
        let classification =
            run_bounded(Stage::Classification, self.timeouts.retrieval, async move {
                classifier.classify(&query).await
            })
            .await?;
        let (domain, confidence) = (classification.domain, classification.confidence);

        if confidence < MIN_CLASSIFICATION_CONFIDENCE {
            return Ok(ChatAnswer::clarification(
                domain,
                confidence,
                CLARIFY_DOMAIN,
                Vec::new(),
                elapsed_ms(),
            ));
        }

        let index = Arc::clone(&self.index);
        let query = q.to_string();
        let results = run_bounded(Stage::Retrieval, self.timeouts.retrieval, async move {
            index.search(&query, RETRIEVAL_K, Some(domain)).await
        })
        .await?;

        if results.is_empty() {
            return Ok(ChatAnswer::clarification(
                domain,
                confidence,
                CLARIFY_NO_RESULTS,
                Vec::new(),
                elapsed_ms(),
            ));
        }

        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let top_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if top_score < MIN_TOP_SCORE {
            return Ok(ChatAnswer::clarification(
                domain,
                confidence,
                CLARIFY_WEAK_MATCHES,
                scores,
                elapsed_ms(),
            ));
        }

        let top = dedup_and_rank(&results);
        let context_blocks: Vec<String> = top.iter().map(|r| r.content.clone()).collect();

        let generator = Arc::clone(&self.generator);
        let query = q.to_string();
        let answer = run_bounded(Stage::Generation, self.timeouts.generation, async move {
            generator.generate(&query, &context_blocks).await
        })
        .await?;

        let citations: Vec<Citation> = top.iter().map(citation_for).collect();
        let latency_ms = elapsed_ms();

        log_answer(&AnswerRecord {
            request_id: &ctx.request_id,
            caller: &ctx.caller.subject,
            question: q,
            answer: &answer,
            latency_ms,
            domain,
            confidence,
            top_score,
            retrieved_k: results.len(),
            final_top_k: top.len(),
        });

        Ok(ChatAnswer {
            domain,
            confidence,
            citations,
            retrieval_scores: scores,
            needs_clarification: false,
            clarification: None,
            latency_ms,
            input_token_count: Some(question.split_whitespace().count()),
            input_char_count: Some(question.chars().count()),
            output_token_count: Some(answer.split_whitespace().count()),
            output_char_count: Some(answer.chars().count()),
            answer: Some(answer),
        })
    }
}

/// Trimmed question if it has 1 to 500 characters.
pub fn validate_question(question: &str) -> Result<&str, ChatError> {
    let q = question.trim();
    let len = q.chars().count();
    if len == 0 || len > MAX_QUESTION_CHARS {
        return Err(ChatError::Validation(format!(
            "question must be 1-{} characters (got {})",
            MAX_QUESTION_CHARS, len
        )));
    }
    Ok(q)
}

/// Normalized duplicate key: the heading (trimmed, lowercased, whitespace
/// collapsed), or the first 120 content characters when the heading is empty.
pub fn dedup_key(chunk: &RetrievedChunk) -> String {
    let heading = chunk
        .metadata
        .heading
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if !heading.is_empty() {
        return heading;
    }
    chunk
        .content
        .chars()
        .take(DEDUP_PREFIX_CHARS)
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Sort by score descending (stable), keep the best chunk per
/// [`dedup_key`], at most [`MAX_CONTEXT_CHUNKS`].
pub fn dedup_and_rank(results: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
    let mut sorted: Vec<&RetrievedChunk> = results.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(MAX_CONTEXT_CHUNKS);
    for chunk in sorted {
        if seen.insert(dedup_key(chunk)) {
            kept.push(chunk.clone());
            if kept.len() >= MAX_CONTEXT_CHUNKS {
                break;
            }
        }
    }
    kept
}

pub fn citation_for(chunk: &RetrievedChunk) -> Citation {
    let mut snippet: String = chunk.content.chars().take(SNIPPET_CHARS).collect();
    if chunk.content.chars().count() > SNIPPET_CHARS {
        snippet.push_str("...");
    }
    Citation {
        source: chunk.metadata.source.clone(),
        heading: chunk.metadata.heading.clone(),
        snippet,
    }
}

/// Aborts the task when dropped, so an abandoned request takes its
/// in-flight backend call down with it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `work` as its own task under `deadline`. Errors, panics and expiry
/// all become [`ChatError::ServiceUnavailable`] for `stage`.
async fn run_bounded<T, F>(stage: Stage, deadline: Duration, work: F) -> Result<T, ChatError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(work));
    match tokio::time::timeout(deadline, &mut task.0).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => {
            tracing::warn!(%stage, error = %format!("{:#}", e), "backend call failed");
            Err(ChatError::unavailable(stage, format!("{:#}", e)))
        }
        Ok(Err(join_err)) => Err(ChatError::unavailable(stage, join_err)),
        Err(_) => {
            tracing::warn!(%stage, deadline_ms = deadline.as_millis() as u64, "backend call timed out");
            Err(ChatError::unavailable(
                stage,
                format!("deadline of {}ms exceeded", deadline.as_millis()),
            ))
        }
    }
}
