//! Application-side document and session store backends.
//!
//! In-memory stores live in `docrag-core`; this module adds the durable
//! ones and the factories that pick a backend from configuration:
//!
//! | Backend | Document store | Session store |
//! |---------|----------------|---------------|
//! | `memory` | [`InMemoryDocumentStore`] | [`InMemorySessionStore`] |
//! | `filesystem` | [`FsDocumentStore`] | |
//! | `s3` | [`S3DocumentStore`] | |
//! | `sqlite` | | [`SqliteSessionStore`] |

pub mod fs;
pub mod s3;
pub mod sqlite_sessions;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use docrag_core::store::memory::{InMemoryDocumentStore, InMemorySessionStore};
use docrag_core::store::{DocumentStore, SessionStore};
use sqlx::SqlitePool;

pub use fs::FsDocumentStore;
pub use s3::S3DocumentStore;
pub use sqlite_sessions::SqliteSessionStore;

use crate::config::Config;

/// Build the configured document store.
pub fn create_document_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryDocumentStore::new()),
        "filesystem" => Arc::new(FsDocumentStore::new(&config.storage.root)?),
        "s3" => {
            let s3 = config
                .storage
                .s3
                .clone()
                .context("[storage.s3] must be configured when storage.backend is 's3'")?;
            Arc::new(S3DocumentStore::from_env(s3)?)
        }
        other => bail!("Unknown storage backend: {}", other),
    };
    Ok(store)
}

/// Build the configured session store. `pool` is required for `sqlite`.
pub fn create_session_store(
    config: &Config,
    pool: Option<&SqlitePool>,
) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.sessions.backend.as_str() {
        "memory" => Arc::new(InMemorySessionStore::new()),
        "sqlite" => {
            let pool = pool.context("sqlite session store needs a database pool")?;
            Arc::new(SqliteSessionStore::new(pool.clone()))
        }
        other => bail!("Unknown sessions backend: {}", other),
    };
    Ok(store)
}

/// Reject keys that could escape a storage root or prefix.
pub(crate) fn check_key(key: &str) -> docrag_core::RagResult<()> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.len() > 255
    {
        return Err(docrag_core::RagError::InvalidInput(format!(
            "invalid document key: '{}'",
            key
        )));
    }
    Ok(())
}
