//! Retrieval-augmented question answering.
//!
//! [`QueryHandler::answer`] embeds the query, retrieves the nearest
//! chunks, packs them into a budgeted context block, renders the prompt,
//! and asks the completion provider once.

use std::sync::Arc;

use docrag_core::completion::CompletionProvider;
use docrag_core::embedding::EmbeddingProvider;
use docrag_core::index::VectorIndex;
use docrag_core::models::{AnswerResult, SupportingChunk};
use docrag_core::prompt::{build_context, render_prompt};
use docrag_core::{RagError, RagResult};

use crate::config::OnEmptyContext;
use crate::retry::CallPolicy;

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub top_k: usize,
    pub context_budget_chars: usize,
    pub on_empty: OnEmptyContext,
    pub max_tokens: usize,
    pub embed_policy: CallPolicy,
    pub completion_policy: CallPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            context_budget_chars: 4000,
            on_empty: OnEmptyContext::Proceed,
            max_tokens: 150,
            embed_policy: CallPolicy::default(),
            completion_policy: CallPolicy::default(),
        }
    }
}

pub struct QueryHandler {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    completer: Arc<dyn CompletionProvider>,
    options: QueryOptions,
}

impl QueryHandler {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        completer: Arc<dyn CompletionProvider>,
        options: QueryOptions,
    ) -> RagResult<Self> {
        if options.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            embedder,
            index,
            completer,
            options,
        })
    }

    pub async fn answer(&self, query: &str) -> RagResult<AnswerResult> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }

        let query_vec = self
            .options
            .embed_policy
            .run("query embedding", || self.embedder.embed(query))
            .await?;

        let hits = self.index.search(&query_vec, self.options.top_k).await?;
        let retrieved = hits.len();
        let context = build_context(hits, self.options.context_budget_chars);

        if context.is_empty() && self.options.on_empty == OnEmptyContext::Fail {
            return Err(RagError::NoContext);
        }
        tracing::debug!(retrieved, used = context.used.len(), "context assembled");

        let prompt = render_prompt(query, &context);
        let text = self
            .options
            .completion_policy
            .run("completion", || {
                self.completer.complete(&prompt, self.options.max_tokens)
            })
            .await?;

        if text.trim().is_empty() {
            return Err(RagError::CompletionFailed(
                "provider returned an empty completion".to_string(),
            ));
        }

        let supporting_chunks = context
            .used
            .into_iter()
            .map(|hit| SupportingChunk {
                id: hit.id,
                document_key: hit.document_key().map(str::to_string),
                chunk_index: hit.chunk_index(),
                distance: hit.distance,
                text: hit.text,
            })
            .collect();

        Ok(AnswerResult {
            text,
            supporting_chunks,
        })
    }
}
