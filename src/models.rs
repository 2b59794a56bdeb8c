//! Core data models used throughout the policy assistant.
//!
//! These types represent the policy documents, chunks, retrieval hits, and
//! chat answers that flow through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The policy area a question or a piece of policy content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "HR")]
    Hr,
    #[serde(rename = "IT")]
    It,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Hr => "HR",
            Domain::It => "IT",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HR" => Ok(Domain::Hr),
            "IT" => Ok(Domain::It),
            other => anyhow::bail!("Unknown domain: '{}'. Must be HR or IT.", other),
        }
    }
}

/// A policy document read from disk at ingestion time.
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    pub domain: Domain,
    pub path: PathBuf,
    pub text: String,
}

impl PolicyDocument {
    /// File name used as the `source` of every chunk (e.g. `hr_policy.md`).
    pub fn source_name(&self) -> String {
        file_component(&self.path, Path::file_name)
    }

    /// File stem used inside chunk ids (e.g. `hr_policy`).
    pub fn source_stem(&self) -> String {
        file_component(&self.path, Path::file_stem)
    }
}

fn file_component(path: &Path, pick: fn(&Path) -> Option<&std::ffi::OsStr>) -> String {
    pick(path)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A heading-scoped window of a policy document, ready for indexing.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Content-addressed id: `{domain}-{source_stem}-{hash12}`.
    pub id: String,
    pub domain: Domain,
    pub source: String,
    pub heading: String,
    pub content: String,
    /// Full SHA-256 of `heading + "\n" + content`.
    pub hash: String,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            domain: self.domain,
            source: self.source.clone(),
            heading: self.heading.clone(),
        }
    }
}

/// Metadata stored alongside every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub domain: Domain,
    pub source: String,
    pub heading: String,
}

/// A nearest-neighbor hit returned by a [`VectorIndex`](crate::index::VectorIndex).
///
/// `score` is `1 - distance`: a ranking signal, not a probability.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    Keywords,
    Embeddings,
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationMethod::Keywords => f.write_str("keywords"),
            ClassificationMethod::Embeddings => f.write_str("embeddings"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub domain: Domain,
    pub confidence: f64,
    pub method: ClassificationMethod,
}

/// A source reference attached to a generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub heading: String,
    pub snippet: String,
}

/// The response to one policy question: either a grounded answer or a
/// clarification prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub domain: Domain,
    pub confidence: f64,
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub retrieval_scores: Vec<f64>,
    pub needs_clarification: bool,
    pub clarification: Option<String>,
    pub latency_ms: u64,
    pub input_token_count: Option<usize>,
    pub input_char_count: Option<usize>,
    pub output_token_count: Option<usize>,
    pub output_char_count: Option<usize>,
}

impl ChatAnswer {
    /// A clarification response: no answer, no citations, no counts.
    pub fn clarification(
        domain: Domain,
        confidence: f64,
        message: &str,
        retrieval_scores: Vec<f64>,
        latency_ms: u64,
    ) -> Self {
        Self {
            domain,
            confidence,
            answer: None,
            citations: Vec::new(),
            retrieval_scores,
            needs_clarification: true,
            clarification: Some(message.to_string()),
            latency_ms,
            input_token_count: None,
            input_char_count: None,
            output_token_count: None,
            output_char_count: None,
        }
    }
}
