//! SQLite-backed [`SessionStore`].
//!
//! A session is one row in `sessions` plus one row per file in
//! `session_files`. Appending a file is a single conditional `INSERT`,
//! so concurrent uploads to the same session cannot overwrite each
//! other's entries. Timestamps are stored as Unix milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docrag_core::models::Session;
use docrag_core::store::SessionStore;
use docrag_core::{RagError, RagResult};
use sqlx::{Row, SqlitePool};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> RagError {
    RagError::StoreUnavailable(format!("session database error: {}", e))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: &str) -> RagResult<Session> {
        let row = sqlx::query("SELECT uploaded_at, expires_at FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| RagError::NotFound(format!("session '{}'", session_id)))?;

        let files: Vec<String> =
            sqlx::query_scalar("SELECT filename FROM session_files WHERE session_id = ? ORDER BY id")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(Session {
            session_id: session_id.to_string(),
            files,
            uploaded_at: from_millis(row.get("uploaded_at")),
            expires_at: from_millis(row.get("expires_at")),
        })
    }

    async fn create(&self, session: Session) -> RagResult<String> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO sessions (session_id, uploaded_at, expires_at) VALUES (?, ?, ?)",
        )
        .bind(&session.session_id)
        .bind(session.uploaded_at.timestamp_millis())
        .bind(session.expires_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if inserted.rows_affected() == 0 {
            return Err(RagError::InvalidInput(format!(
                "session '{}' already exists",
                session.session_id
            )));
        }

        for filename in &session.files {
            sqlx::query("INSERT INTO session_files (session_id, filename) VALUES (?, ?)")
                .bind(&session.session_id)
                .bind(filename)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(session.session_id)
    }

    async fn append_file(&self, session_id: &str, filename: &str) -> RagResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO session_files (session_id, filename)
            SELECT ?, ? WHERE EXISTS (SELECT 1 FROM sessions WHERE session_id = ?)
            "#,
        )
        .bind(session_id)
        .bind(filename)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RagError::NotFound(format!("session '{}'", session_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use chrono::Duration;
    use std::sync::Arc;

    async fn setup() -> (tempfile::TempDir, SqliteSessionStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("sessions.sqlite"))
            .await
            .unwrap();
        migrate::migrate(&pool).await.unwrap();
        (tmp, SqliteSessionStore::new(pool))
    }

    #[tokio::test]
    async fn test_create_get_append() {
        let (_tmp, store) = setup().await;
        let session = Session::start("a.txt", Utc::now(), Duration::hours(1));
        let id = store.create(session.clone()).await.unwrap();
        assert!(matches!(
            store.create(session.clone()).await,
            Err(RagError::InvalidInput(_))
        ));

        store.append_file(&id, "b.txt").await.unwrap();
        let loaded = store.get(&id).await.unwrap();
        assert_eq!(loaded.files, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(
            loaded.expires_at.timestamp_millis(),
            session.expires_at.timestamp_millis()
        );

        assert!(matches!(
            store.append_file("nope", "c.txt").await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(store.get("nope").await, Err(RagError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_not_lost() {
        let (_tmp, store) = setup().await;
        let store = Arc::new(store);
        let id = store
            .create(Session::start("first.txt", Utc::now(), Duration::hours(1)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.append_file(&id, &format!("f{}.txt", i)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let files = store.get(&id).await.unwrap().files;
        assert_eq!(files.len(), 21);
        assert_eq!(files[0], "first.txt");
    }
}
