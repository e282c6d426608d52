//! TOML configuration parsing and validation.
//!
//! A single file drives every component: database location, chunking
//! policy, index metric, retrieval depth, and the embedding and generation
//! providers. See [`load_config`] for the validation rules.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    /// Where ingested source files are copied to.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// Generate a summary right after a successful ingestion.
    #[serde(default = "default_true")]
    pub auto_summary: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            auto_summary: true,
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

/// Similarity metric shared by every collection in the process.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Metric::Cosine),
            "dot" => Some(Metric::Dot),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    #[serde(default)]
    pub metric: Metric,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_qa_k")]
    pub qa_k: usize,
    #[serde(default = "default_summary_k")]
    pub summary_k: usize,
    /// Records scoring below this are never returned.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qa_k: default_qa_k(),
            summary_k: default_summary_k(),
            min_score: None,
        }
    }
}

fn default_qa_k() -> usize {
    5
}
fn default_summary_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
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
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
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

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on the characters of retrieved text stuffed into one prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_generation_timeout_secs(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_generation_model() -> String {
    "llama2".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_max_context_chars() -> usize {
    12_000
}

impl Config {
    /// Configuration with every section at its default, rooted at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            library: LibraryConfig::default(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
        }
    }

    /// Embedding dimension every collection must share.
    ///
    /// The local provider falls back to its model's native size.
    pub fn embedding_dims(&self) -> usize {
        match self.embedding.dims {
            Some(d) => d,
            None if self.embedding.provider == "local" => local_model_dims(
                self.embedding
                    .model
                    .as_deref()
                    .unwrap_or(DEFAULT_LOCAL_MODEL),
            ),
            None => 0,
        }
    }
}

pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

pub fn local_model_dims(model: &str) -> usize {
    match model {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        _ => 384,
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.qa_k == 0 || config.retrieval.summary_k == 0 {
        anyhow::bail!("retrieval.qa_k and retrieval.summary_k must be >= 1");
    }

    if config.generation.max_context_chars == 0 {
        anyhow::bail!("generation.max_context_chars must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or local.",
            other
        ),
    }

    if config.embedding.provider == "ollama" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when provider is 'ollama'");
        }
        if config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
        }
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.generation.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!("[db]\npath = \"/tmp/books.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.qa_k, 5);
        assert_eq!(config.retrieval.summary_k, 20);
        assert_eq!(config.index.metric, Metric::Cosine);
        assert!(!config.embedding.is_enabled());
        assert!(config.library.auto_summary);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_ollama_requires_dims_and_model() {
        assert!(parse("[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\n").is_err());
        assert!(parse("[embedding]\nprovider = \"ollama\"\ndims = 768\n").is_err());
        let ok = parse("[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n")
            .unwrap();
        assert_eq!(ok.embedding_dims(), 768);
    }

    #[test]
    fn test_local_dims_default_to_model_size() {
        let config = parse("[embedding]\nprovider = \"local\"\n").unwrap();
        assert_eq!(config.embedding_dims(), 384);
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_dot_metric() {
        let config = parse("[index]\nmetric = \"dot\"\n").unwrap();
        assert_eq!(config.index.metric, Metric::Dot);
    }
}
