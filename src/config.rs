//! TOML configuration parsing and validation.
//!
//! docrag is configured via a TOML file (default: `config/docrag.toml`).
//! Every section except `[server]` is optional and falls back to defaults
//! suitable for a local, in-memory setup.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-4"
//!
//! [storage]
//! backend = "s3"
//!
//! [storage.s3]
//! bucket = "rag-uploads"
//! region = "us-east-1"
//! ```
//!
//! Secrets are never read from the file: `OPENAI_API_KEY` and the
//! `AWS_*` credentials come from the environment.

use anyhow::{bail, Context, Result};
use docrag_core::index::Metric;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docrag.sqlite")
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

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama or an OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl EmbeddingConfig {
    /// Dimension of the configured provider's vectors.
    pub fn resolved_dims(&self) -> usize {
        self.dims.unwrap_or(match self.provider.as_str() {
            "hashing" => 256,
            _ => 1536,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: None,
            url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_completion_provider() -> String {
    "disabled".to_string()
}
fn default_max_tokens() -> usize {
    150
}
fn default_completion_timeout_secs() -> u64 {
    60
}

/// What the query handler does when retrieval yields no usable context.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnEmptyContext {
    /// Ask the model anyway, with a "no supporting context" marker.
    #[default]
    Proceed,
    /// Fail with `NoContext` (HTTP 404).
    Fail,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_budget_chars")]
    pub context_budget_chars: usize,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub on_empty: OnEmptyContext,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_budget_chars: default_context_budget_chars(),
            metric: Metric::default(),
            on_empty: OnEmptyContext::default(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_context_budget_chars() -> usize {
    4000
}

/// Behavior when a document key is ingested again.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReingestMode {
    /// Remove the key's previous entries before indexing.
    #[default]
    Replace,
    /// Keep previous entries; duplicates accumulate.
    Append,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default)]
    pub reingest: ReingestMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            reingest: ReingestMode::default(),
        }
    }
}

fn default_memory_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// `"memory"`, `"filesystem"`, or `"s3"`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_storage_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            timeout_secs: default_storage_timeout_secs(),
            s3: None,
        }
    }
}

fn default_storage_backend() -> String {
    "filesystem".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/documents")
}
fn default_storage_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

/// Longest accepted session lifetime (ten years).
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

impl SessionsConfig {
    /// Session lifetime, clamped to [`MAX_SESSION_TTL_SECS`].
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }
}

impl Config {
    /// Whether any backend needs the SQLite database.
    pub fn uses_sqlite(&self) -> bool {
        self.index.backend == "sqlite" || self.sessions.backend == "sqlite"
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.timeout_secs)
    }
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "hashing" | "openai" | "ollama" | "disabled" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, or disabled.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_retries > 1 || config.completion.max_retries > 1 {
        bail!("max_retries must be 0 or 1");
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "openai" | "ollama" | "disabled" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be openai, ollama, or disabled.",
            other
        ),
    }
    if config.completion.max_tokens == 0 {
        bail!("completion.max_tokens must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_budget_chars == 0 {
        bail!("retrieval.context_budget_chars must be > 0");
    }

    // Validate backends
    match config.index.backend.as_str() {
        "memory" | "sqlite" => {}
        other => bail!("Unknown index backend: '{}'. Must be memory or sqlite.", other),
    }
    match config.sessions.backend.as_str() {
        "memory" | "sqlite" => {}
        other => bail!(
            "Unknown sessions backend: '{}'. Must be memory or sqlite.",
            other
        ),
    }
    match config.storage.backend.as_str() {
        "memory" | "filesystem" => {}
        "s3" => {
            if config.storage.s3.is_none() {
                bail!("[storage.s3] must be configured when storage.backend is 's3'");
            }
        }
        other => bail!(
            "Unknown storage backend: '{}'. Must be memory, filesystem, or s3.",
            other
        ),
    }
    if config.server.max_upload_bytes == 0 {
        bail!("server.max_upload_bytes must be > 0");
    }
    if config.sessions.ttl_secs == 0 || config.sessions.ttl_secs > MAX_SESSION_TTL_SECS {
        bail!(
            "sessions.ttl_secs must be between 1 and {}",
            MAX_SESSION_TTL_SECS
        );
    }

    Ok(())
}
