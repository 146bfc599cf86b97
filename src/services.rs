//! Component wiring.
//!
//! [`Services::from_config`] builds every component exactly once and
//! shares them through `Arc`s: one vector index, one embedder, one
//! completer, and the stores. The HTTP server and the CLI both work on
//! a `Services` value; there is no global state.

use std::sync::Arc;

use anyhow::{Context, Result};
use docrag_core::chunk::{ChunkConfig, Chunker};
use docrag_core::completion::CompletionProvider;
use docrag_core::embedding::EmbeddingProvider;
use docrag_core::index::flat::FlatIndex;
use docrag_core::index::VectorIndex;
use docrag_core::store::{DocumentStore, SessionStore};

use crate::answer::{QueryHandler, QueryOptions};
use crate::completion::create_completer;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ingest::{IngestOptions, IngestPipeline};
use crate::retry::CallPolicy;
use crate::sqlite_index::SqliteIndex;
use crate::stores::{create_document_store, create_session_store};
use crate::upload::UploadService;
use crate::{db, migrate};

pub struct Services {
    pub config: Config,
    pub pipeline: Arc<IngestPipeline>,
    pub queries: Arc<QueryHandler>,
    pub uploads: Arc<UploadService>,
}

/// Explicitly supplied collaborators, used in place of the configured ones.
pub struct Components {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub completer: Arc<dyn CompletionProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub documents: Arc<dyn DocumentStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Services {
    /// Build all components described by `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = if config.uses_sqlite() {
            let pool = db::connect(&config).await?;
            migrate::migrate(&pool).await?;
            Some(pool)
        } else {
            None
        };

        let embedder = create_embedder(&config.embedding)?;
        let completer = create_completer(&config.completion)?;

        let dims = config.embedding.resolved_dims();
        let metric = config.retrieval.metric;
        let index: Arc<dyn VectorIndex> = match (config.index.backend.as_str(), pool.as_ref()) {
            ("sqlite", Some(pool)) => Arc::new(
                SqliteIndex::open(pool.clone(), dims, metric)
                    .await
                    .context("Failed to open SQLite index")?,
            ),
            _ => Arc::new(FlatIndex::new(dims, metric)?),
        };

        let documents = create_document_store(&config)?;
        let sessions = create_session_store(&config, pool.as_ref())?;

        tracing::info!(
            embedding = embedder.model_name(),
            completion = completer.model_name(),
            index = %config.index.backend,
            storage = %config.storage.backend,
            sessions = %config.sessions.backend,
            "services ready"
        );

        Self::with_components(
            config,
            Components {
                embedder,
                completer,
                index,
                documents,
                sessions,
            },
        )
    }

    /// Wire the given components using the limits and policies in `config`.
    pub fn with_components(config: Config, components: Components) -> Result<Self> {
        let chunker = Chunker::new(ChunkConfig::new(
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        )?);
        let embed_policy = CallPolicy::for_embedding(&config.embedding);
        let completion_policy = CallPolicy::for_completion(&config.completion);
        let store_policy = CallPolicy {
            timeout: config.storage_timeout(),
            ..embed_policy
        };

        let pipeline = Arc::new(IngestPipeline::new(
            chunker,
            components.embedder.clone(),
            components.index.clone(),
            components.documents,
            IngestOptions {
                batch_size: config.embedding.batch_size,
                reingest: config.index.reingest,
                embed_policy,
                store_policy,
            },
        )?);

        let queries = Arc::new(QueryHandler::new(
            components.embedder,
            components.index,
            components.completer,
            QueryOptions {
                top_k: config.retrieval.top_k,
                context_budget_chars: config.retrieval.context_budget_chars,
                on_empty: config.retrieval.on_empty,
                max_tokens: config.completion.max_tokens,
                embed_policy,
                completion_policy,
            },
        )?);

        let uploads = Arc::new(UploadService::new(
            pipeline.clone(),
            components.sessions,
            config.sessions.ttl(),
            store_policy,
        ));

        Ok(Self {
            config,
            pipeline,
            queries,
            uploads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> Config {
        let text = format!("[server]\nbind = \"127.0.0.1:0\"\n{}", extra);
        let config: Config = toml::from_str(&text).unwrap();
        crate::config::validate(&config).unwrap();
        config
    }

    #[tokio::test]
    async fn test_in_memory_services() {
        let services = Services::from_config(config("[storage]\nbackend = \"memory\"\n"))
            .await
            .unwrap();
        let receipt = services
            .uploads
            .upload("fox.txt", b"The quick brown fox.".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(receipt.chunk_count, 1);
        assert_eq!(services.pipeline.index().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_services_persist_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let extra = format!(
            "[db]\npath = \"{}\"\n[index]\nbackend = \"sqlite\"\n[sessions]\nbackend = \"sqlite\"\n[storage]\nroot = \"{}\"\n",
            tmp.path().join("db.sqlite").display(),
            tmp.path().join("docs").display()
        );

        let services = Services::from_config(config(&extra)).await.unwrap();
        let receipt = services
            .uploads
            .upload("a.txt", b"persisted text".to_vec(), None)
            .await
            .unwrap();
        drop(services);

        let reopened = Services::from_config(config(&extra)).await.unwrap();
        assert_eq!(reopened.pipeline.index().len().await.unwrap(), 1);
        let session = reopened.uploads.session(&receipt.session_id).await.unwrap();
        assert_eq!(session.files, vec!["a.txt".to_string()]);
    }
}
