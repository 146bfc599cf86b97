//! Document ingestion: decode, chunk, embed, and index.
//!
//! [`IngestPipeline::ingest`] runs one document through the full flow:
//!
//! ```text
//! bytes → UTF-8 decode → Chunker → embed_many in batches (call policy)
//!       → VectorIndex::insert in order
//! ```
//!
//! Chunks are inserted in sequence order, so entry ids of one document
//! increase with `chunk_index`.
//!
//! In `replace` mode every batch is embedded before the document's old
//! entries are removed, so a failed re-ingest leaves the previous version
//! searchable and reports `indexed: 0`. In `append` mode each batch is
//! inserted as soon as it is embedded; if embedding fails part-way, the
//! chunks already inserted stay in the index and the error reports how many.

use std::sync::Arc;

use docrag_core::chunk::Chunker;
use docrag_core::embedding::EmbeddingProvider;
use docrag_core::index::VectorIndex;
use docrag_core::models::{Chunk, IngestResult};
use docrag_core::store::DocumentStore;
use docrag_core::{RagError, RagResult};

use crate::config::ReingestMode;
use crate::retry::CallPolicy;

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub reingest: ReingestMode,
    pub embed_policy: CallPolicy,
    pub store_policy: CallPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            reingest: ReingestMode::Replace,
            embed_policy: CallPolicy::default(),
            store_policy: CallPolicy::default(),
        }
    }
}

pub struct IngestPipeline {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    options: IngestOptions,
}

/// Decode document bytes, reporting the first invalid byte's offset.
pub fn decode(document_key: &str, bytes: &[u8]) -> RagResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| RagError::Decode {
            key: document_key.to_string(),
            offset: e.valid_up_to(),
        })
}

impl IngestPipeline {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        options: IngestOptions,
    ) -> RagResult<Self> {
        if options.batch_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "embedding batch size must be > 0".to_string(),
            ));
        }
        if embedder.dims() != index.dims() {
            return Err(RagError::InvalidConfiguration(format!(
                "embedder produces {}-dimensional vectors but the index expects {}",
                embedder.dims(),
                index.dims()
            )));
        }
        Ok(Self {
            chunker,
            embedder,
            index,
            store,
            options,
        })
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Ingest one document's bytes under `document_key`.
    pub async fn ingest(&self, document_key: &str, bytes: &[u8]) -> RagResult<IngestResult> {
        if document_key.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "document key must not be empty".to_string(),
            ));
        }
        let text = decode(document_key, bytes)?;
        let chunks = self.chunker.split(document_key, &text);

        let replaced = match self.options.reingest {
            ReingestMode::Replace => {
                let mut vectors = Vec::with_capacity(chunks.len());
                for batch in chunks.chunks(self.options.batch_size) {
                    vectors.extend(self.embed_batch(document_key, batch, 0).await?);
                }
                let replaced = self.index.remove_document(document_key).await?;
                self.insert_chunks(&chunks, vectors).await?;
                replaced
            }
            ReingestMode::Append => {
                let mut indexed = 0usize;
                for batch in chunks.chunks(self.options.batch_size) {
                    let vectors = self.embed_batch(document_key, batch, indexed).await?;
                    self.insert_chunks(batch, vectors).await?;
                    indexed += batch.len();
                }
                0
            }
        };

        tracing::info!(
            document_key,
            chunks = chunks.len(),
            replaced,
            "document indexed"
        );

        Ok(IngestResult {
            document_key: document_key.to_string(),
            chunk_count: chunks.len(),
            replaced,
        })
    }

    /// Embed one batch under the call policy. `indexed` is reported on failure.
    async fn embed_batch(
        &self,
        document_key: &str,
        batch: &[Chunk],
        indexed: usize,
    ) -> RagResult<Vec<Vec<f32>>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let vectors = match self
            .options
            .embed_policy
            .run("embedding", || self.embedder.embed_many(&texts))
            .await
        {
            Ok(v) => v,
            Err(e @ RagError::ProviderTimeout { .. }) => {
                tracing::warn!(document_key, indexed, "embedding timed out");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(document_key, indexed, error = %e, "embedding failed");
                return Err(RagError::EmbeddingFailed {
                    indexed,
                    reason: e.to_string(),
                });
            }
        };

        if vectors.len() != batch.len() {
            return Err(RagError::EmbeddingFailed {
                indexed,
                reason: format!(
                    "provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                ),
            });
        }
        Ok(vectors)
    }

    async fn insert_chunks(&self, chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> RagResult<()> {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            self.index
                .insert(vector, chunk.text.clone(), chunk.metadata())
                .await?;
        }
        Ok(())
    }

    /// Read `document_key` from the document store and ingest it.
    pub async fn ingest_from_store(&self, document_key: &str) -> RagResult<IngestResult> {
        let bytes = self
            .options
            .store_policy
            .run("document store read", || self.store.get(document_key))
            .await?;
        self.ingest(document_key, &bytes).await
    }
}
