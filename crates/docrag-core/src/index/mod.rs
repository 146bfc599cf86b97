//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines storage and nearest-neighbor lookup
//! of `(embedding, text, metadata)` entries, enabling pluggable backends
//! (in-memory [`flat::FlatIndex`], SQLite in the app crate).
//!
//! # Contract
//!
//! | Method | Behavior |
//! |--------|----------|
//! | [`insert`](VectorIndex::insert) | Store an entry, return a fresh unique id |
//! | [`search`](VectorIndex::search) | Up to `k` hits, ascending distance, ties by insertion order |
//! | [`remove`](VectorIndex::remove) | Delete by id, `NotFound` if unknown |
//! | [`remove_document`](VectorIndex::remove_document) | Delete all entries of a document |
//!
//! Dimension and metric are fixed at construction. Ids are never reused.

pub mod flat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, euclidean_distance};
use crate::error::{RagError, RagResult};
use crate::models::{Metadata, META_CHUNK_INDEX, META_DOCUMENT_KEY};

/// Distance metric used to rank search hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// `1 - cosine_similarity`, in `[0, 2]`.
    Cosine,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Euclidean => euclidean_distance(a, b),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Cosine => "cosine",
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: u64,
    pub distance: f32,
    pub text: String,
    pub metadata: Metadata,
}

impl SearchHit {
    pub fn document_key(&self) -> Option<&str> {
        self.metadata.get(META_DOCUMENT_KEY).and_then(|v| v.as_str())
    }

    pub fn chunk_index(&self) -> Option<u64> {
        self.metadata.get(META_CHUNK_INDEX).and_then(|v| v.as_u64())
    }
}

/// Abstract vector index.
///
/// Implementations must be safe to share across tasks: `insert` may run
/// concurrently with `search` and with other inserts. New entries may or
/// may not be visible to an in-flight search, but id allocation is atomic.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Vector dimensionality accepted by this index.
    fn dims(&self) -> usize;

    /// Metric used by [`search`](VectorIndex::search).
    fn metric(&self) -> Metric;

    /// Store an entry and return its newly allocated id.
    async fn insert(&self, embedding: Vec<f32>, text: String, metadata: Metadata)
        -> RagResult<u64>;

    /// Return at most `k` entries nearest to `query`.
    async fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<SearchHit>>;

    /// Remove one entry by id.
    async fn remove(&self, id: u64) -> RagResult<()>;

    /// Remove every entry whose `document_key` metadata equals `key`.
    ///
    /// Returns the number of entries removed.
    async fn remove_document(&self, key: &str) -> RagResult<usize>;

    /// Number of live entries.
    async fn len(&self) -> RagResult<usize>;

    async fn is_empty(&self) -> RagResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Reject vectors whose length differs from the index dimension.
pub fn check_dims(expected: usize, v: &[f32]) -> RagResult<()> {
    if v.len() != expected {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: v.len(),
        });
    }
    Ok(())
}

/// Sort hits by ascending distance, then ascending id, and keep `k`.
///
/// NaN distances sort last.
pub fn rank_hits(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or_else(|| a.distance.is_nan().cmp(&b.distance.is_nan()))
            .then(a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: u64, distance: f32) -> SearchHit {
        SearchHit {
            id,
            distance,
            text: String::new(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_rank_ties_by_id() {
        let ranked = rank_hits(vec![hit(3, 0.5), hit(1, 0.5), hit(2, 0.1)], 10);
        let ids: Vec<u64> = ranked.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_rank_nan_last() {
        let ranked = rank_hits(vec![hit(1, f32::NAN), hit(2, 3.0)], 10);
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn test_rank_truncates() {
        assert_eq!(rank_hits(vec![hit(1, 1.0), hit(2, 2.0)], 1).len(), 1);
        assert!(rank_hits(vec![hit(1, 1.0)], 0).is_empty());
    }

    #[test]
    fn test_metric_distances() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((Metric::Euclidean.distance(&a, &b) - 2f32.sqrt()).abs() < 1e-6);
        assert!((Metric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!(Metric::Cosine.distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn test_metric_serde_lowercase() {
        let m: Metric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(m, Metric::Cosine);
        assert_eq!(Metric::default().as_str(), "euclidean");
    }
}
