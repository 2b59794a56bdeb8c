//! Two-stage HR/IT domain classifier.
//!
//! 1. **Keywords**: count case-insensitive substring hits against fixed HR
//!    and IT keyword sets. A nonzero, unequal count decides the domain with
//!    `confidence = min(0.9, 0.6 + 0.1 * |diff|)`.
//! 2. **Embeddings**: otherwise compare the question embedding with
//!    reference embeddings of the full HR and IT policy texts. Ties go to
//!    HR; `confidence = clamp(0.5 + |sim_hr - sim_it|, 0.5, 0.95)`.
//!
//! Reference embeddings are computed once, when the classifier is built.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::embedding::{cosine_similarity, embed_one, Embedder};
use crate::models::{ClassificationMethod, ClassificationResult, Domain};

pub const HR_KEYWORDS: &[&str] = &[
    "leave",
    "annual",
    "vacation",
    "holiday",
    "payroll",
    "salary",
    "benefit",
    "probation",
    "timesheet",
    "overtime",
    "sick",
    "per diem",
    "expense",
    "remote",
    "onsite",
    "attendance",
    "policy",
];

pub const IT_KEYWORDS: &[&str] = &[
    "vpn",
    "password",
    "account",
    "email",
    "laptop",
    "device",
    "hardware",
    "software",
    "access",
    "network",
    "security",
    "mfa",
    "2fa",
    "ticket",
    "backup",
    "antivirus",
    "data",
];

pub struct DomainClassifier {
    embedder: Arc<dyn Embedder>,
    hr_reference: Vec<f32>,
    it_reference: Vec<f32>,
}

impl DomainClassifier {
    /// Embed both reference texts in one call and build the classifier.
    pub async fn new(embedder: Arc<dyn Embedder>, hr_text: &str, it_text: &str) -> Result<Self> {
        let mut refs = embedder
            .embed(&[hr_text.to_string(), it_text.to_string()])
            .await?
            .into_iter();
        let (hr_reference, it_reference) = match (refs.next(), refs.next()) {
            (Some(hr), Some(it)) => (hr, it),
            _ => return Err(anyhow!("embedder returned fewer than two reference vectors")),
        };
        Ok(Self::with_references(embedder, hr_reference, it_reference))
    }

    /// Build from precomputed reference embeddings.
    pub fn with_references(
        embedder: Arc<dyn Embedder>,
        hr_reference: Vec<f32>,
        it_reference: Vec<f32>,
    ) -> Self {
        Self {
            embedder,
            hr_reference,
            it_reference,
        }
    }

    pub async fn classify(&self, question: &str) -> Result<ClassificationResult> {
        if let Some(result) = classify_keywords(question) {
            return Ok(result);
        }

        let q = embed_one(self.embedder.as_ref(), question).await?;
        let sim_hr = cosine_similarity(&q, &self.hr_reference) as f64;
        let sim_it = cosine_similarity(&q, &self.it_reference) as f64;
        Ok(classify_similarity(sim_hr, sim_it))
    }
}

/// `(hr_hits, it_hits)`: each keyword counts at most once.
pub fn keyword_hits(question: &str) -> (usize, usize) {
    let q = question.to_lowercase();
    let count = |words: &[&str]| words.iter().filter(|w| q.contains(*w)).count();
    (count(HR_KEYWORDS), count(IT_KEYWORDS))
}

/// Keyword stage. `None` when there are no hits or the counts are equal.
pub fn classify_keywords(question: &str) -> Option<ClassificationResult> {
    let (hr, it) = keyword_hits(question);
    if hr == it {
        return None;
    }
    let domain = if hr > it { Domain::Hr } else { Domain::It };
    let diff = hr.abs_diff(it) as f64;
    Some(ClassificationResult {
        domain,
        confidence: (0.6 + 0.1 * diff).min(0.9),
        method: ClassificationMethod::Keywords,
    })
}

/// Embedding stage decision from the two reference similarities.
pub fn classify_similarity(sim_hr: f64, sim_it: f64) -> ClassificationResult {
    let domain = if sim_hr >= sim_it { Domain::Hr } else { Domain::It };
    ClassificationResult {
        domain,
        confidence: (0.5 + (sim_hr - sim_it).abs()).clamp(0.5, 0.95),
        method: ClassificationMethod::Embeddings,
    }
}
