//! Hybrid Retrieval & Reranking
//!
//! Lexical (BM25) and semantic (HNSW + MMR) candidates are merged with weighted
//! reciprocal rank fusion, then compressed to the most relevant few with a
//! cross-encoder.

mod fusion;
mod hybrid;
pub mod mmr;
mod reranker;
mod semantic;

pub use fusion::{weighted_rank_fusion, FusionConfig, FusionError};
pub use hybrid::HybridRetriever;
pub use reranker::{FastEmbedReranker, RelevanceCompressor, RelevanceScorer, RerankError};
pub use semantic::{SemanticError, SemanticIndex};

use crate::document::Chunk;
use serde::{Deserialize, Serialize};

/// A ranked candidate. Scores are only comparable within one retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    /// 1-based position in the list that produced it
    pub rank: usize,
}

/// A retrieval step that fell back instead of failing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalDegraded {
    /// Semantic search failed; only lexical results were fused
    SemanticUnavailable { reason: String },
    /// No relevance model; fused candidates were truncated unranked
    RerankerUnavailable { reason: String },
}

impl std::fmt::Display for RetrievalDegraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SemanticUnavailable { reason } => {
                write!(f, "semantic retrieval unavailable: {}", reason)
            }
            Self::RerankerUnavailable { reason } => {
                write!(f, "relevance reranking unavailable: {}", reason)
            }
        }
    }
}

/// Final context for one query
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    /// Compressed results, most relevant first
    pub results: Vec<RetrievalResult>,
    pub degradations: Vec<RetrievalDegraded>,
}

impl RetrievedContext {
    pub fn chunks(&self) -> Vec<Chunk> {
        self.results.iter().map(|r| r.chunk.clone()).collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}
