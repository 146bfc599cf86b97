//! Upload sessions: store a document, index it, and track it in a session.
//!
//! An upload without a session id opens a new session (UUID v4, TTL from
//! `[sessions] ttl_secs`). An upload with a session id appends to that
//! session, which must exist and must not have expired. Sessions are
//! never deleted; they just stop accepting uploads once expired.

use std::sync::Arc;

use chrono::Utc;
use docrag_core::models::{IngestResult, Session};
use docrag_core::store::SessionStore;
use docrag_core::{RagError, RagResult};
use serde::Serialize;

use crate::ingest::IngestPipeline;
use crate::retry::CallPolicy;

pub const MAX_FILE_NAME_BYTES: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub session_id: String,
    pub message: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub session_id: String,
    pub documents: Vec<IngestResult>,
}

pub struct UploadService {
    pipeline: Arc<IngestPipeline>,
    sessions: Arc<dyn SessionStore>,
    ttl: chrono::Duration,
    store_policy: CallPolicy,
}

/// Accept plain file names only.
pub fn validate_file_name(name: &str) -> RagResult<()> {
    let reason = if name.trim().is_empty() {
        Some("file name must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("file name must not contain path separators")
    } else if name.contains("..") {
        Some("file name must not contain '..'")
    } else if name.len() > MAX_FILE_NAME_BYTES {
        Some("file name is longer than 255 bytes")
    } else if name.chars().any(char::is_control) {
        Some("file name must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(r) => Err(RagError::InvalidInput(r.to_string())),
        None => Ok(()),
    }
}

impl UploadService {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        sessions: Arc<dyn SessionStore>,
        ttl: chrono::Duration,
        store_policy: CallPolicy,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            ttl,
            store_policy,
        }
    }

    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }

    /// Fetch a session regardless of expiry.
    pub async fn session(&self, session_id: &str) -> RagResult<Session> {
        self.sessions.get(session_id).await
    }

    pub async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        session_id: Option<&str>,
    ) -> RagResult<UploadReceipt> {
        validate_file_name(file_name)?;
        if bytes.is_empty() {
            return Err(RagError::InvalidInput("upload body is empty".to_string()));
        }

        if let Some(id) = session_id {
            let session = self.sessions.get(id).await?;
            if session.is_expired(Utc::now()) {
                return Err(RagError::NotFound(format!("session '{}' has expired", id)));
            }
        }

        let store = self.pipeline.store();
        self.store_policy
            .run("document store write", || store.put(file_name, bytes.clone()))
            .await?;

        let result = self.pipeline.ingest(file_name, &bytes).await?;

        let session_id = match session_id {
            Some(id) => {
                self.sessions.append_file(id, file_name).await?;
                id.to_string()
            }
            None => {
                let session = Session::start(file_name, Utc::now(), self.ttl);
                self.sessions.create(session).await?
            }
        };

        tracing::info!(
            filename = file_name,
            session_id = %session_id,
            chunks = result.chunk_count,
            "upload complete"
        );

        Ok(UploadReceipt {
            filename: file_name.to_string(),
            session_id,
            message: "File uploaded successfully".to_string(),
            chunk_count: result.chunk_count,
        })
    }

    /// Re-ingest every file of a session from the document store.
    pub async fn reindex_session(&self, session_id: &str) -> RagResult<ReindexReport> {
        let session = self.sessions.get(session_id).await?;
        let mut documents = Vec::with_capacity(session.files.len());
        for file in &session.files {
            documents.push(self.pipeline.ingest_from_store(file).await?);
        }
        Ok(ReindexReport {
            session_id: session.session_id,
            documents,
        })
    }

    /// Delete a document's bytes and every index entry derived from it.
    ///
    /// Returns the number of index entries removed. A document missing
    /// from the store but present in the index is still purged.
    pub async fn remove_document(&self, key: &str) -> RagResult<usize> {
        validate_file_name(key)?;
        let store = self.pipeline.store();
        let deleted = self
            .store_policy
            .run("document store delete", || store.delete(key))
            .await;
        let removed = self.pipeline.index().remove_document(key).await?;
        match deleted {
            Ok(()) => Ok(removed),
            Err(RagError::NotFound(_)) if removed > 0 => Ok(removed),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReingestMode;
    use crate::ingest::IngestOptions;
    use docrag_core::chunk::{ChunkConfig, Chunker};
    use docrag_core::embedding::HashingEmbedder;
    use docrag_core::index::flat::FlatIndex;
    use docrag_core::index::Metric;
    use docrag_core::store::memory::{InMemoryDocumentStore, InMemorySessionStore};
    use std::time::Duration;

    fn service(ttl: chrono::Duration) -> UploadService {
        let policy = CallPolicy::new(Duration::from_secs(1), 1, Duration::from_millis(1));
        let pipeline = IngestPipeline::new(
            Chunker::new(ChunkConfig::new(20, 5).unwrap()),
            Arc::new(HashingEmbedder::new(16).unwrap()),
            Arc::new(FlatIndex::new(16, Metric::Euclidean).unwrap()),
            Arc::new(InMemoryDocumentStore::new()),
            IngestOptions {
                batch_size: 8,
                reingest: ReingestMode::Replace,
                embed_policy: policy,
                store_policy: policy,
            },
        )
        .unwrap();
        UploadService::new(
            Arc::new(pipeline),
            Arc::new(InMemorySessionStore::new()),
            ttl,
            policy,
        )
    }

    #[test]
    fn test_file_name_validation() {
        assert!(validate_file_name("notes.txt").is_ok());
        assert!(validate_file_name("résumé 2024.md").is_ok());
        for bad in ["", "  ", "a/b.txt", "a\\b.txt", "../x", "x\n.txt"] {
            assert!(
                matches!(validate_file_name(bad), Err(RagError::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(validate_file_name(&"a".repeat(256)).is_err());
        assert!(validate_file_name(&"a".repeat(255)).is_ok());
    }

    #[tokio::test]
    async fn test_upload_creates_then_appends_session() {
        let svc = service(chrono::Duration::hours(1));
        let first = svc
            .upload("a.txt", b"alpha document text".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(first.filename, "a.txt");
        assert_eq!(first.chunk_count, 1);

        let second = svc
            .upload("b.txt", b"beta document".to_vec(), Some(&first.session_id))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);

        let session = svc.session(&first.session_id).await.unwrap();
        assert_eq!(session.files, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(svc.pipeline().store().get("b.txt").await.unwrap(), b"beta document");
    }

    #[tokio::test]
    async fn test_unknown_and_expired_sessions() {
        let svc = service(chrono::Duration::hours(1));
        assert!(matches!(
            svc.upload("a.txt", b"x".to_vec(), Some("missing")).await,
            Err(RagError::NotFound(_))
        ));

        let expired = service(chrono::Duration::zero());
        let receipt = expired.upload("a.txt", b"x".to_vec(), None).await.unwrap();
        assert!(matches!(
            expired
                .upload("b.txt", b"y".to_vec(), Some(&receipt.session_id))
                .await,
            Err(RagError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let svc = service(chrono::Duration::hours(1));
        assert!(matches!(
            svc.upload("a.txt", Vec::new(), None).await,
            Err(RagError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_reindex_and_remove() {
        let svc = service(chrono::Duration::hours(1));
        let receipt = svc
            .upload("a.txt", b"some text that spans chunks".to_vec(), None)
            .await
            .unwrap();
        let report = svc.reindex_session(&receipt.session_id).await.unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].replaced, receipt.chunk_count);

        let removed = svc.remove_document("a.txt").await.unwrap();
        assert_eq!(removed, receipt.chunk_count);
        assert!(svc.pipeline().index().is_empty().await.unwrap());
        assert!(matches!(
            svc.remove_document("a.txt").await,
            Err(RagError::NotFound(_))
        ));
    }
}
