//! Completion provider implementations.
//!
//! - **[`OpenAICompleter`]** calls `POST /v1/chat/completions`.
//! - **[`OllamaCompleter`]** calls `POST /api/generate` with streaming off.
//! - **[`DisabledCompleter`]** fails every call.
//!
//! Like the embedders, each call is a single attempt; the query handler
//! wraps it in a [`CallPolicy`](crate::retry::CallPolicy).

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use docrag_core::completion::CompletionProvider;
use docrag_core::{RagError, RagResult};
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::retry::{request_error, status_error};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

/// System message sent ahead of every chat prompt.
pub const SYSTEM_MESSAGE: &str = "The following is a conversation with an AI assistant.";

pub struct DisabledCompleter;

#[async_trait]
impl CompletionProvider for DisabledCompleter {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str, _max_tokens: usize) -> RagResult<String> {
        Err(RagError::InvalidConfiguration(
            "completion provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI ============

pub struct OpenAICompleter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAICompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::with_endpoint(
            api_key,
            config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL),
            config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        ))
    }

    pub fn with_endpoint(api_key: String, base_url: &str, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAICompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> RagResult<String> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::permanent(format!("invalid OpenAI chat response: {}", e)))?;
        Ok(parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

// ============ Ollama ============

pub struct OllamaCompleter {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaCompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("completion.model required for Ollama provider"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url: config
                .url
                .as_deref()
                .unwrap_or(OLLAMA_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            model,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl CompletionProvider for OllamaCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> RagResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "system": SYSTEM_MESSAGE,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": max_tokens },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::permanent(format!("invalid Ollama response: {}", e)))?;
        Ok(parsed.response)
    }
}

/// Create the configured [`CompletionProvider`].
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAICompleter::new(config)?),
        "ollama" => Arc::new(OllamaCompleter::new(config)?),
        "disabled" => Arc::new(DisabledCompleter),
        other => bail!("Unknown completion provider: {}", other),
    };
    Ok(provider)
}
