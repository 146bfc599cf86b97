//! In-memory brute-force [`VectorIndex`].
//!
//! Ids come from an `AtomicU64` counter, so concurrent inserts never see
//! the same id and ids are never reused after removal. Entries live in a
//! `BTreeMap` keyed by id behind a `std::sync::RwLock`; search scans every
//! entry under a read lock and computes exact distances.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{check_dims, rank_hits, Metric, SearchHit, VectorIndex};
use crate::error::{RagError, RagResult};
use crate::models::{Metadata, META_DOCUMENT_KEY};

struct StoredEntry {
    embedding: Vec<f32>,
    text: String,
    metadata: Metadata,
}

/// In-memory vector index with exact nearest-neighbor search.
pub struct FlatIndex {
    dims: usize,
    metric: Metric,
    next_id: AtomicU64,
    entries: RwLock<BTreeMap<u64, StoredEntry>>,
}

impl FlatIndex {
    pub fn new(dims: usize, metric: Metric) -> RagResult<Self> {
        if dims == 0 {
            return Err(RagError::InvalidConfiguration(
                "index dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            dims,
            metric,
            next_id: AtomicU64::new(1),
            entries: RwLock::new(BTreeMap::new()),
        })
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
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
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            id,
            StoredEntry {
                embedding,
                text,
                metadata,
            },
        );
        Ok(id)
    }

    async fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<SearchHit>> {
        check_dims(self.dims, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let hits: Vec<SearchHit> = entries
            .iter()
            .map(|(id, e)| SearchHit {
                id: *id,
                distance: self.metric.distance(query, &e.embedding),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
            })
            .collect();
        Ok(rank_hits(hits, k))
    }

    async fn remove(&self, id: u64) -> RagResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RagError::NotFound(format!("index entry {}", id)))
    }

    async fn remove_document(&self, key: &str) -> RagResult<usize> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| {
            e.metadata.get(META_DOCUMENT_KEY).and_then(|v| v.as_str()) != Some(key)
        });
        Ok(before - entries.len())
    }

    async fn len(&self) -> RagResult<usize> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}
