//! TOML configuration for the policy assistant.
//!
//! Every setting the pipeline consumes lives in one file (default
//! `./config/policy.toml`): index location, chunking windows, the embedding
//! provider, the generation backend, pipeline deadlines, the HTTP boundary,
//! logging, and the list of policy sources to ingest.
//!
//! [`load_config`] parses and validates the file; invalid values are
//! rejected up front so the pipeline never has to re-check them.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Domain;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: Some("all-minilm".to_string()),
            dims: Some(384),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Which inference backend answers questions. Bound once at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Chat-style backend: role-tagged messages to Ollama's `/api/chat`.
    Ollama,
    /// Flat-prompt backend: text-generation-inference `/generate` with
    /// explicit decoding parameters.
    #[serde(alias = "transformers")]
    TextGeneration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_host")]
    pub host: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_generation_model(),
            host: default_generation_host(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_backend() -> BackendKind {
    BackendKind::Ollama
}
fn default_generation_model() -> String {
    "llama3".to_string()
}
fn default_generation_host() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_max_new_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_secs: u64,
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval_timeout_secs: default_retrieval_timeout(),
            generation_timeout_secs: default_generation_timeout(),
        }
    }
}

impl PipelineConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

fn default_retrieval_timeout() -> u64 {
    5
}
fn default_generation_timeout() -> u64 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Name of the environment variable holding the bearer-token secret.
    #[serde(default = "default_token_secret_env")]
    pub token_secret_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            token_secret_env: default_token_secret_env(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
fn default_token_secret_env() -> String {
    "POLICY_TOKEN_SECRET".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "policy_assistant=info".to_string()
}

/// One policy document to ingest.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub domain: Domain,
    pub path: PathBuf,
}

impl Config {
    /// Source entries for one domain, in configuration order.
    pub fn sources_for(&self, domain: Domain) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(move |s| s.domain == domain)
    }
}

impl EmbeddingConfig {
    fn requires_model(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }

    /// Settings for embedders on the request path: a failed call surfaces
    /// immediately instead of backing off under a request deadline.
    pub fn for_queries(&self) -> Self {
        Self {
            max_retries: 0,
            ..self.clone()
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking: a step of max_chars - overlap must make forward progress
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!(
            "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.max_chars
        );
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.requires_model() {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if config.generation.max_new_tokens == 0 {
        bail!("generation.max_new_tokens must be > 0");
    }
    if !(config.generation.temperature >= 0.0) {
        bail!("generation.temperature must be >= 0.0");
    }

    if config.pipeline.retrieval_timeout_secs == 0 {
        bail!("pipeline.retrieval_timeout_secs must be > 0");
    }
    if config.pipeline.generation_timeout_secs == 0 {
        bail!("pipeline.generation_timeout_secs must be > 0");
    }

    // The classifier needs one reference text per domain
    for domain in [Domain::Hr, Domain::It] {
        if config.sources_for(domain).next().is_none() {
            bail!("at least one [[sources]] entry with domain = \"{}\" is required", domain);
        }
    }

    // Chunks record only the file name, so it must identify one source per domain
    let mut seen = HashSet::new();
    for source in &config.sources {
        let name = source.path.file_name().map(|n| n.to_string_lossy().into_owned());
        let Some(name) = name else {
            bail!("source path has no file name: {}", source.path.display());
        };
        if !seen.insert((source.domain, name.clone())) {
            bail!(
                "duplicate {} source file name '{}': sources in one domain need distinct file names",
                source.domain,
                name
            );
        }
    }

    Ok(())
}
