/// HNSW vector index and the per-session collection registry
use hnsw_rs::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Cannot build an index without vectors")]
    Empty,

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// HNSW construction and search parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Connections per layer
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// Search result with ID and similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Position of the vector in build order
    pub id: usize,
    /// Cosine similarity (higher is more similar)
    pub score: f32,
}

/// Immutable HNSW index that also keeps the raw vectors for re-ranking
pub struct VectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    params: HnswParams,
}

impl VectorIndex {
    /// Build an index over `vectors`; a vector's id is its position
    pub fn build(vectors: Vec<Vec<f32>>, params: HnswParams) -> Result<Self, VectorIndexError> {
        let dimension = vectors.first().map(Vec::len).ok_or(VectorIndexError::Empty)?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let index = Hnsw::<f32, DistCosine>::new(
            params.m,
            vectors.len(),
            16, // max layers
            params.ef_construction,
            DistCosine,
        );

        for (id, vector) in vectors.iter().enumerate() {
            index.insert((vector, id));
        }

        Ok(Self {
            index,
            vectors,
            dimension,
            params,
        })
    }

    /// Search for the k nearest neighbours, most similar first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let ef_search = self.params.ef_search.max(k);
        let mut results: Vec<SearchResult> = self
            .index
            .search(query, k, ef_search)
            .into_iter()
            .map(|neighbor| SearchResult {
                id: neighbor.d_id,
                score: 1.0 - neighbor.distance, // Convert distance to similarity
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        Ok(results)
    }

    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Process-wide registry of named vector collections
///
/// Each session owns one collection. Replacing a name keeps the displaced index
/// alive for whoever still holds it, and removal only succeeds for the exact
/// index that was registered, so a late cleanup can never drop its successor.
#[derive(Default)]
pub struct VectorStore {
    collections: RwLock<HashMap<String, Arc<VectorIndex>>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `index` under `name`, replacing any previous collection
    pub async fn insert_collection(&self, name: &str, index: Arc<VectorIndex>) {
        let len = index.len();
        let mut collections = self.collections.write().await;
        if collections.insert(name.to_string(), index).is_some() {
            tracing::warn!("Replaced existing vector collection {}", name);
        }
        tracing::debug!("Registered vector collection {} ({} vectors)", name, len);
    }

    /// Remove `name` if it still refers to `index`; returns whether it was removed
    pub async fn drop_collection(&self, name: &str, index: &Arc<VectorIndex>) -> bool {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(current) if Arc::ptr_eq(current, index) => {
                collections.remove(name);
                tracing::debug!("Dropped vector collection {}", name);
                true
            }
            _ => false,
        }
    }

    /// Whether `name` currently refers to exactly `index`
    pub async fn holds(&self, name: &str, index: &Arc<VectorIndex>) -> bool {
        self.collections
            .read()
            .await
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, index))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.collections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.collections.read().await.is_empty()
    }
}
