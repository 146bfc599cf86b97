//! Embedding provider implementations.
//!
//! The [`EmbeddingProvider`] trait lives in `docrag-core`. This module
//! provides the network-backed implementations and the factory:
//!
//! - **[`OpenAIEmbedder`]** calls `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `POST /api/embed`.
//! - **[`DisabledEmbedder`]** fails every call; used when embeddings are off.
//! - `"hashing"` maps to the offline [`HashingEmbedder`] from the core crate.
//!
//! Each provider makes exactly one HTTP attempt per call. Timeouts and
//! retries are applied by the caller through [`CallPolicy`](crate::retry::CallPolicy),
//! using [`status_error`] and [`request_error`] to mark failures transient.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use docrag_core::embedding::{EmbeddingProvider, HashingEmbedder};
use docrag_core::{RagError, RagResult};
use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::retry::{request_error, status_error};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_many(&self, _texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Err(RagError::InvalidConfiguration(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI ============

/// Embedder using the OpenAI embeddings API (or a compatible endpoint).
///
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::with_endpoint(
            api_key,
            config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL),
            model,
            config.resolved_dims(),
        ))
    }

    pub fn with_endpoint(api_key: String, base_url: &str, model: String, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dims,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Order `data[]` by its `index` field so vectors line up with the inputs.
fn parse_openai_response(json: serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    let mut parsed: OpenAIEmbeddingResponse = serde_json::from_value(json)
        .map_err(|e| RagError::permanent(format!("invalid OpenAI embedding response: {}", e)))?;
    parsed.data.sort_by_key(|item| item.index);
    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI", status, &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| request_error("OpenAI", e))?;
        parse_openai_response(json)
    }
}

// ============ Ollama ============

/// Embedder using a local Ollama instance.
///
/// Requires an embedding model pulled into Ollama (e.g. `nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            model,
            dims: config.resolved_dims(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::transient(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, &text));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::permanent(format!("invalid Ollama response: {}", e)))?;
        Ok(parsed.embeddings)
    }
}

// ============ Factory ============

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"disabled"` | [`DisabledEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "hashing" => Arc::new(HashingEmbedder::new(config.resolved_dims())?),
        "openai" => Arc::new(OpenAIEmbedder::new(config)?),
        "ollama" => Arc::new(OllamaEmbedder::new(config)?),
        "disabled" => Arc::new(DisabledEmbedder {
            dims: config.resolved_dims(),
        }),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(provider)
}
