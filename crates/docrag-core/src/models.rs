//! Core data models used throughout docrag.
//!
//! These types represent the chunks, sessions, and pipeline results that
//! flow through ingestion and retrieval.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key holding the source document key of an index entry.
pub const META_DOCUMENT_KEY: &str = "document_key";
/// Metadata key holding the chunk sequence index of an index entry.
pub const META_CHUNK_INDEX: &str = "chunk_index";
/// Metadata key holding the chunk's start offset (in characters).
pub const META_START_OFFSET: &str = "start_offset";

/// Free-form metadata attached to an index entry.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A contiguous slice of a document's decoded text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub document_key: String,
    /// Position in the chunk sequence, starting at 0.
    pub chunk_index: usize,
    /// Offset of the first character, counted in Unicode scalar values.
    pub start_offset: usize,
    /// Number of leading characters shared with the previous chunk.
    pub overlap: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    /// Index metadata for this chunk.
    pub fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(META_DOCUMENT_KEY.into(), self.document_key.clone().into());
        meta.insert(META_CHUNK_INDEX.into(), self.chunk_index.into());
        meta.insert(META_START_OFFSET.into(), self.start_offset.into());
        meta
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    pub document_key: String,
    pub chunk_count: usize,
    /// Index entries removed before re-indexing (replace mode).
    pub replaced: usize,
}

/// A retrieved chunk that was placed into the prompt context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportingChunk {
    pub id: u64,
    pub document_key: Option<String>,
    pub chunk_index: Option<u64>,
    pub distance: f32,
    pub text: String,
}

/// Answer produced by the query handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub text: String,
    pub supporting_chunks: Vec<SupportingChunk>,
}

/// A group of uploaded documents under one caller-visible id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub files: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a session with a fresh UUID holding one file.
    pub fn start(first_file: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            files: vec![first_file.to_string()],
            uploaded_at: now,
            expires_at: now + ttl,
        }
    }

    /// Sessions expire passively; the store never deletes them.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session::start("a.txt", now, Duration::hours(1));
        assert_eq!(session.files, vec!["a.txt".to_string()]);
        assert!(!session.is_expired(now));
        assert!(!session.is_expired(now + Duration::minutes(59)));
        assert!(session.is_expired(now + Duration::hours(1)));
    }

    #[test]
    fn test_session_ids_unique() {
        let now = Utc::now();
        let a = Session::start("a.txt", now, Duration::hours(1));
        let b = Session::start("a.txt", now, Duration::hours(1));
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_chunk_metadata_keys() {
        let chunk = Chunk {
            document_key: "doc.txt".into(),
            chunk_index: 3,
            start_offset: 24,
            overlap: 2,
            text: "abc".into(),
            hash: String::new(),
        };
        let meta = chunk.metadata();
        assert_eq!(meta[META_DOCUMENT_KEY], "doc.txt");
        assert_eq!(meta[META_CHUNK_INDEX], 3);
        assert_eq!(meta[META_START_OFFSET], 24);
    }
}
