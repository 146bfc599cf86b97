//! Local-directory document store.
//!
//! Each document is a file named by its key directly under the root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use docrag_core::store::DocumentStore;
use docrag_core::{RagError, RagResult};

use super::check_key;

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Use `root` as the storage directory, creating it if missing.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create storage root: {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> RagResult<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(key: &str, e: std::io::Error) -> RagError {
    if e.kind() == ErrorKind::NotFound {
        RagError::NotFound(format!("document '{}'", key))
    } else {
        RagError::StoreUnavailable(format!("document '{}': {}", key, e))
    }
}

/// A failed write is never a missing document.
fn write_error(key: &str, e: std::io::Error) -> RagError {
    RagError::StoreUnavailable(format!("writing document '{}': {}", key, e))
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RagResult<()> {
        let path = self.path_for(key)?;
        // Unique fixed-length temp name per write, then rename over the target.
        let tmp = self
            .root
            .join(format!(".{}.partial", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_error(key, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_error(key, e));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> RagResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| io_error(key, e))
    }

    async fn delete(&self, key: &str) -> RagResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| io_error(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_get_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsDocumentStore::new(&tmp.path().join("docs")).unwrap();

        store.put("notes.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("notes.txt").await.unwrap(), b"hello");
        assert!(tmp.path().join("docs/notes.txt").exists());

        store.put("notes.txt", b"again".to_vec()).await.unwrap();
        assert_eq!(store.get("notes.txt").await.unwrap(), b"again");

        store.delete("notes.txt").await.unwrap();
        assert!(matches!(
            store.get("notes.txt").await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("notes.txt").await,
            Err(RagError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_same_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FsDocumentStore::new(tmp.path()).unwrap());

        for round in 0..20 {
            let mut handles = Vec::new();
            for writer in 0..8 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    let body = format!("round {} writer {}", round, writer);
                    store.put("same.txt", body.into_bytes()).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        let body = String::from_utf8(store.get("same.txt").await.unwrap()).unwrap();
        assert!(body.starts_with("round 19 writer "));
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_longest_valid_file_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsDocumentStore::new(tmp.path()).unwrap();
        let key = format!("{}.txt", "n".repeat(crate::upload::MAX_FILE_NAME_BYTES - 4));
        assert_eq!(key.len(), crate::upload::MAX_FILE_NAME_BYTES);
        crate::upload::validate_file_name(&key).unwrap();

        store.put(&key, b"long".to_vec()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"long");
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FsDocumentStore::new(tmp.path()).unwrap();
        for key in ["../escape.txt", "a/b.txt", "a\\b.txt", ""] {
            assert!(matches!(
                store.put(key, b"x".to_vec()).await,
                Err(RagError::InvalidInput(_))
            ));
        }
    }
}
