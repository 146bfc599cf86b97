//! SQLite-backed [`VectorIndex`].
//!
//! Entries live in the `index_entries` table with embeddings stored as
//! little-endian f32 BLOBs. Search loads every vector and ranks in Rust,
//! the same exact brute-force search as the in-memory flat index but
//! durable across restarts.
//!
//! Ids come from `INTEGER PRIMARY KEY AUTOINCREMENT`, so they are unique
//! under concurrent inserts and never reused after deletes. The index's
//! dimension and metric are recorded in `index_meta` on first open; a
//! later open with different settings is rejected.

use async_trait::async_trait;
use docrag_core::embedding::{blob_to_vec, vec_to_blob};
use docrag_core::index::{check_dims, rank_hits, Metric, SearchHit, VectorIndex};
use docrag_core::models::{Metadata, META_CHUNK_INDEX, META_DOCUMENT_KEY};
use docrag_core::{RagError, RagResult};
use sqlx::{Row, SqlitePool};

pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
    metric: Metric,
}

fn db_error(e: sqlx::Error) -> RagError {
    RagError::StoreUnavailable(format!("index database error: {}", e))
}

impl SqliteIndex {
    /// Open the index on a migrated pool.
    pub async fn open(pool: SqlitePool, dims: usize, metric: Metric) -> RagResult<Self> {
        if dims == 0 {
            return Err(RagError::InvalidConfiguration(
                "index dimension must be > 0".to_string(),
            ));
        }
        check_or_record(&pool, "dims", &dims.to_string()).await?;
        check_or_record(&pool, "metric", metric.as_str()).await?;
        Ok(Self { pool, dims, metric })
    }
}

async fn check_or_record(pool: &SqlitePool, key: &str, value: &str) -> RagResult<()> {
    sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .map_err(db_error)?;

    let stored: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await
        .map_err(db_error)?;

    if stored != value {
        return Err(RagError::InvalidConfiguration(format!(
            "index was created with {} = {}, but {} is configured",
            key, stored, value
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    async fn insert(
        &self,
        embedding: Vec<f32>,
        text: String,
        metadata: Metadata,
    ) -> RagResult<u64> {
        check_dims(self.dims, &embedding)?;
        let document_key = metadata
            .get(META_DOCUMENT_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let chunk_index = metadata.get(META_CHUNK_INDEX).and_then(|v| v.as_i64());
        let metadata_json = serde_json::Value::Object(metadata).to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO index_entries (document_key, chunk_index, text, metadata_json, embedding)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(document_key)
        .bind(chunk_index)
        .bind(text)
        .bind(metadata_json)
        .bind(vec_to_blob(&embedding))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.last_insert_rowid() as u64)
    }

    async fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<SearchHit>> {
        check_dims(self.dims, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, text, metadata_json, embedding FROM index_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let metadata_json: String = row.get("metadata_json");
            let metadata = match serde_json::from_str::<serde_json::Value>(&metadata_json) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => Metadata::new(),
            };
            let id: i64 = row.get("id");
            hits.push(SearchHit {
                id: id as u64,
                distance: self.metric.distance(query, &vector),
                text: row.get("text"),
                metadata,
            });
        }

        Ok(rank_hits(hits, k))
    }

    async fn remove(&self, id: u64) -> RagResult<()> {
        let result = sqlx::query("DELETE FROM index_entries WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(RagError::NotFound(format!("index entry {}", id)));
        }
        Ok(())
    }

    async fn remove_document(&self, key: &str) -> RagResult<usize> {
        let result = sqlx::query("DELETE FROM index_entries WHERE document_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> RagResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use std::sync::Arc;

    async fn setup(dims: usize) -> (tempfile::TempDir, SqliteIndex) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        migrate::migrate(&pool).await.unwrap();
        let index = SqliteIndex::open(pool, dims, Metric::Euclidean)
            .await
            .unwrap();
        (tmp, index)
    }

    fn meta(key: &str, chunk: usize) -> Metadata {
        let mut m = Metadata::new();
        m.insert(META_DOCUMENT_KEY.into(), key.into());
        m.insert(META_CHUNK_INDEX.into(), chunk.into());
        m
    }

    #[tokio::test]
    async fn test_insert_search_sorted() {
        let (_tmp, index) = setup(2).await;
        index.insert(vec![0.0, 0.0], "origin".into(), meta("a", 0)).await.unwrap();
        index.insert(vec![3.0, 4.0], "far".into(), meta("a", 1)).await.unwrap();
        index.insert(vec![1.0, 0.0], "near".into(), meta("b", 0)).await.unwrap();

        let hits = index.search(&[0.0, 0.0], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["origin", "near"]);
        assert_eq!(hits[1].document_key(), Some("b"));
        assert_eq!(hits[1].chunk_index(), Some(0));
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dimension_checked() {
        let (_tmp, index) = setup(3).await;
        assert!(matches!(
            index.insert(vec![1.0], "x".into(), Metadata::new()).await,
            Err(RagError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(index.search(&[1.0, 2.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_ids_not_reused_and_remove_document() {
        let (_tmp, index) = setup(1).await;
        let a = index.insert(vec![1.0], "a".into(), meta("doc", 0)).await.unwrap();
        let b = index.insert(vec![2.0], "b".into(), meta("doc", 1)).await.unwrap();
        index.remove(b).await.unwrap();
        let c = index.insert(vec![3.0], "c".into(), meta("other", 0)).await.unwrap();
        assert!(c > b && b > a);
        assert!(matches!(index.remove(b).await, Err(RagError::NotFound(_))));

        assert_eq!(index.remove_document("doc").await.unwrap(), 1);
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reopen_with_other_dims_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        migrate::migrate(&pool).await.unwrap();
        SqliteIndex::open(pool.clone(), 4, Metric::Cosine).await.unwrap();
        assert!(SqliteIndex::open(pool.clone(), 8, Metric::Cosine).await.is_err());
        assert!(SqliteIndex::open(pool, 4, Metric::Euclidean).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_distinct_ids() {
        let (_tmp, index) = setup(1).await;
        let index = Arc::new(index);
        let mut handles = Vec::new();
        for i in 0..50 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                index
                    .insert(vec![i as f32], format!("t{}", i), Metadata::new())
                    .await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
        assert_eq!(index.len().await.unwrap(), 50);
    }
}
