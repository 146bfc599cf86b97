//! Storage abstractions for uploaded documents and sessions.
//!
//! [`DocumentStore`] holds raw document bytes keyed by name (object
//! storage, a local directory, or memory). [`SessionStore`] tracks which
//! documents belong to which upload session.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::RagResult;
use crate::models::Session;

/// Bytes-level storage for uploaded documents.
///
/// # Errors
///
/// Missing keys are [`RagError::NotFound`](crate::RagError::NotFound);
/// backend failures are
/// [`RagError::StoreUnavailable`](crate::RagError::StoreUnavailable).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RagResult<()>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> RagResult<Vec<u8>>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> RagResult<()>;
}

/// Session metadata table.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, [`RagError::NotFound`](crate::RagError::NotFound)
    /// if unknown. Expired sessions are still returned.
    async fn get(&self, session_id: &str) -> RagResult<Session>;

    /// Persist a new session and return its id.
    async fn create(&self, session: Session) -> RagResult<String>;

    /// Append `filename` to a session's file list.
    ///
    /// Atomic per session id: concurrent appends are never lost.
    async fn append_file(&self, session_id: &str, filename: &str) -> RagResult<()>;
}
