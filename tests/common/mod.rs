//! Shared test doubles: a deterministic embedder, a scripted index, and
//! inference backends with fixed behavior. Nothing here touches the network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use policy_assistant::classifier::DomainClassifier;
use policy_assistant::embedding::Embedder;
use policy_assistant::generator::{AnswerGenerator, InferenceBackend, Prompt};
use policy_assistant::index::VectorIndex;
use policy_assistant::models::{ChunkMetadata, Domain, PolicyDocument, RetrievedChunk};
use policy_assistant::pipeline::{ChatPipeline, PipelineTimeouts};

pub const AXES: &[&str] = &[
    "leave", "annual", "payroll", "sick", "vpn", "password", "mfa", "laptop",
];

/// One dimension per axis word: 1.0 if the lowercased text contains it.
pub struct AxisEmbedder;

pub fn axis_vector(text: &str) -> Vec<f32> {
    let t = text.to_lowercase();
    AXES.iter()
        .map(|w| if t.contains(w) { 1.0 } else { 0.0 })
        .collect()
}

#[async_trait]
impl Embedder for AxisEmbedder {
    fn model_name(&self) -> &str {
        "axis"
    }
    fn dims(&self) -> usize {
        AXES.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| axis_vector(t)).collect())
    }
}

pub const HR_POLICY: &str = "# HR Policy\n\nApplies to all employees.\n\n\
## Annual Leave\n\nEmployees accrue 20 days of annual leave per year.\n\n\
## Sick Leave\n\nUp to 10 sick days with a medical note.\n\n\
## Payroll\n\nPayroll runs on the last working day of each month.\n";

pub const IT_POLICY: &str = "# IT Policy\n\n\
## VPN Access\n\nRemote work requires the VPN with MFA enabled.\n\n\
## Passwords\n\nA password must be rotated every 90 days.\n\n\
## Laptops\n\nReport a lost laptop to the service desk immediately.\n";

pub fn policy_documents() -> Vec<PolicyDocument> {
    vec![
        PolicyDocument {
            domain: Domain::Hr,
            path: "data/hr_policy.md".into(),
            text: HR_POLICY.to_string(),
        },
        PolicyDocument {
            domain: Domain::It,
            path: "data/it_policy.md".into(),
            text: IT_POLICY.to_string(),
        },
    ]
}

pub async fn classifier() -> Arc<DomainClassifier> {
    Arc::new(
        DomainClassifier::new(Arc::new(AxisEmbedder), HR_POLICY, IT_POLICY)
            .await
            .unwrap(),
    )
}

pub fn hit(domain: Domain, heading: &str, content: &str, score: f64) -> RetrievedChunk {
    RetrievedChunk {
        content: content.to_string(),
        metadata: ChunkMetadata {
            domain,
            source: match domain {
                Domain::Hr => "hr_policy.md".to_string(),
                Domain::It => "it_policy.md".to_string(),
            },
            heading: heading.to_string(),
        },
        score,
    }
}

/// Index that returns canned results, optionally after a delay or with an error.
pub struct ScriptedIndex {
    pub results: Vec<RetrievedChunk>,
    pub delay: Option<Duration>,
    pub fail: bool,
    pub searches: AtomicUsize,
}

impl ScriptedIndex {
    pub fn returning(results: Vec<RetrievedChunk>) -> Self {
        Self {
            results,
            delay: None,
            fail: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn slow(results: Vec<RetrievedChunk>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(results)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(Vec::new())
        }
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn add(&self, _: &[String], _: &[String], _: &[ChunkMetadata]) -> Result<()> {
        bail!("scripted index is read-only")
    }

    async fn search(
        &self,
        _query: &str,
        k: usize,
        domain: Option<Domain>,
    ) -> Result<Vec<RetrievedChunk>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            bail!("index connection refused");
        }
        Ok(self
            .results
            .iter()
            .filter(|r| domain.map_or(true, |d| r.metadata.domain == d))
            .take(k)
            .cloned()
            .collect())
    }

    async fn prune(&self, _: Domain, _: &str, _: &[String]) -> Result<u64> {
        Ok(0)
    }

    async fn count(&self, _: Option<Domain>) -> Result<u64> {
        Ok(self.results.len() as u64)
    }
}

/// Backend that answers with fixed text and counts calls.
pub struct FixedBackend {
    pub answer: String,
    pub delay: Option<Duration>,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FixedBackend {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delay: None,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl InferenceBackend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            bail!("model server returned 500");
        }
        Ok(self.answer.clone())
    }
}

pub fn timeouts() -> PipelineTimeouts {
    PipelineTimeouts {
        retrieval: Duration::from_secs(5),
        generation: Duration::from_secs(5),
    }
}

pub async fn pipeline_with(
    index: Arc<dyn VectorIndex>,
    backend: FixedBackend,
    timeouts: PipelineTimeouts,
) -> ChatPipeline {
    ChatPipeline::new(
        classifier().await,
        index,
        Arc::new(AnswerGenerator::new(Box::new(backend))),
        timeouts,
    )
}
