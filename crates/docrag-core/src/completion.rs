//! Completion provider trait.
//!
//! Concrete clients (OpenAI chat completions, Ollama generate) live in the
//! `docrag` app crate.

use async_trait::async_trait;

use crate::error::RagResult;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`, limited to `max_tokens`.
    async fn complete(&self, prompt: &str, max_tokens: usize) -> RagResult<String>;
}
