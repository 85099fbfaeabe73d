//! Semantic retrieval: nearest neighbours re-selected with MMR

use super::mmr::maximal_marginal_relevance;
use super::RetrievalResult;
use crate::config::RetrievalConfig;
use crate::document::Chunk;
use crate::embedding::{
    BatchEmbedder, EmbeddingError, HnswParams, VectorIndex, VectorIndexError, VectorStore,
};
use ndarray::{Array2, ArrayView1};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Vector index returned unknown id {0}")]
    UnknownId(usize),

    #[error("Invalid candidate matrix: {0}")]
    Shape(String),

    #[error("Index build task failed: {0}")]
    Task(String),
}

/// Session-scoped semantic index
///
/// Owns the `temp_{session_id}` collection in the shared [`VectorStore`]. The
/// collection is only registered by [`SemanticIndex::register`], which the
/// session store calls when the session goes live, and must be released when
/// the session goes away.
pub struct SemanticIndex {
    collection: String,
    index: Arc<VectorIndex>,
    chunks: Arc<[Chunk]>,
    embedder: BatchEmbedder,
    store: Arc<VectorStore>,
    k: usize,
    fetch_k: usize,
    lambda: f32,
}

impl SemanticIndex {
    pub fn collection_name(session_id: &str) -> String {
        format!("temp_{}", session_id)
    }

    /// Embed every chunk once and build the HNSW index
    pub async fn build(
        session_id: &str,
        chunks: Arc<[Chunk]>,
        embedder: BatchEmbedder,
        store: Arc<VectorStore>,
        config: &RetrievalConfig,
    ) -> Result<Self, SemanticError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_all(&texts).await?;

        let params = HnswParams {
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            ef_search: config.hnsw_ef_search,
        };
        let index = tokio::task::spawn_blocking(move || VectorIndex::build(vectors, params))
            .await
            .map_err(|e| SemanticError::Task(e.to_string()))??;

        let collection = Self::collection_name(session_id);
        let index = Arc::new(index);

        tracing::info!(
            "Built semantic index {} with {} vectors ({}D)",
            collection,
            index.len(),
            index.dimension()
        );

        Ok(Self {
            collection,
            index,
            chunks,
            embedder,
            store,
            k: config.k,
            fetch_k: config.fetch_k,
            lambda: config.mmr_lambda,
        })
    }

    /// Fetch `fetch_k` neighbours of the query, then keep `k` of them by MMR
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>, SemanticError> {
        let query_vector = self.embedder.embed_one(query).await?;
        let neighbours = self.index.search(&query_vector, self.fetch_k)?;
        if neighbours.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.index.dimension();
        let mut flat = Vec::with_capacity(neighbours.len() * dimension);
        for neighbour in &neighbours {
            let vector = self
                .index
                .vector(neighbour.id)
                .ok_or(SemanticError::UnknownId(neighbour.id))?;
            flat.extend_from_slice(vector);
        }
        let candidates = Array2::from_shape_vec((neighbours.len(), dimension), flat)
            .map_err(|e| SemanticError::Shape(e.to_string()))?;

        let picked = maximal_marginal_relevance(
            ArrayView1::from(query_vector.as_slice()),
            candidates.view(),
            self.k,
            self.lambda,
        );

        picked
            .into_iter()
            .enumerate()
            .map(|(rank, row)| {
                let neighbour = &neighbours[row];
                let chunk = self
                    .chunks
                    .get(neighbour.id)
                    .ok_or(SemanticError::UnknownId(neighbour.id))?;
                Ok(RetrievalResult {
                    chunk: chunk.clone(),
                    score: neighbour.score,
                    rank: rank + 1,
                })
            })
            .collect()
    }

    /// Publish this index as its session's collection, replacing any other
    pub async fn register(&self) {
        self.store
            .insert_collection(&self.collection, self.index.clone())
            .await;
    }

    /// Whether the store's collection for this session is this index
    pub async fn is_registered(&self) -> bool {
        self.store.holds(&self.collection, &self.index).await
    }

    /// Drop this index's collection from the store
    pub async fn release(&self) -> bool {
        let released = self.store.drop_collection(&self.collection, &self.index).await;
        if released {
            tracing::debug!("Released semantic index {}", self.collection);
        }
        released
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
