//! In-memory [`DocumentStore`] and [`SessionStore`] implementations.
//!
//! Use `HashMap`s behind `std::sync` locks. Session appends happen under
//! the mutex, so the read-modify-write of a file list is never split.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use super::{DocumentStore, SessionStore};
use crate::error::{RagError, RagResult};
use crate::models::Session;

/// In-memory document store for testing and ephemeral deployments.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RagResult<()> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> RagResult<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| RagError::NotFound(format!("document '{}'", key)))
    }

    async fn delete(&self, key: &str) -> RagResult<()> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RagError::NotFound(format!("document '{}'", key)))
    }
}

/// In-memory session table.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> RagResult<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| RagError::NotFound(format!("session '{}'", session_id)))
    }

    async fn create(&self, session: Session) -> RagResult<String> {
        let id = session.session_id.clone();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(RagError::InvalidInput(format!(
                "session '{}' already exists",
                id
            )));
        }
        sessions.insert(id.clone(), session);
        Ok(id)
    }

    async fn append_file(&self, session_id: &str, filename: &str) -> RagResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| RagError::NotFound(format!("session '{}'", session_id)))?;
        session.files.push(filename.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_document_put_get_delete() {
        let store = InMemoryDocumentStore::new();
        store.put("a.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a.txt").await.unwrap(), b"hello");
        store.put("a.txt", b"bye".to_vec()).await.unwrap();
        assert_eq!(store.get("a.txt").await.unwrap(), b"bye");
        store.delete("a.txt").await.unwrap();
        assert!(matches!(
            store.get("a.txt").await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("a.txt").await,
            Err(RagError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_create_get_append() {
        let store = InMemorySessionStore::new();
        let session = Session::start("a.txt", Utc::now(), Duration::hours(1));
        let id = store.create(session.clone()).await.unwrap();
        assert_eq!(id, session.session_id);
        assert!(store.create(session).await.is_err());

        store.append_file(&id, "b.txt").await.unwrap();
        let loaded = store.get(&id).await.unwrap();
        assert_eq!(loaded.files, vec!["a.txt".to_string(), "b.txt".to_string()]);

        assert!(matches!(
            store.append_file("missing", "c.txt").await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(store.get("missing").await, Err(RagError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_not_lost() {
        let store = Arc::new(InMemorySessionStore::new());
        let id = store
            .create(Session::start("first.txt", Utc::now(), Duration::hours(1)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.append_file(&id, &format!("file-{}.txt", i)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let files = store.get(&id).await.unwrap().files;
        assert_eq!(files.len(), 65);
        for i in 0..64 {
            assert!(files.contains(&format!("file-{}.txt", i)));
        }
    }
}
