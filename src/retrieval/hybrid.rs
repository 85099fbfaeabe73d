//! Hybrid search combining semantic and keyword search

use crate::embedding::KeywordIndex;
use crate::retrieval::{
    weighted_rank_fusion, FusionConfig, RelevanceCompressor, RetrievalDegraded, RetrievedContext,
    SemanticIndex,
};
use std::sync::Arc;

/// Hybrid retriever for one session's document
///
/// Lexical and semantic search run concurrently; their lists are fused and
/// the fused candidates compressed. A semantic failure degrades to lexical
/// results only.
pub struct HybridRetriever {
    lexical: Arc<KeywordIndex>,
    semantic: Arc<SemanticIndex>,
    fusion: FusionConfig,
    compressor: Arc<RelevanceCompressor>,
}

impl HybridRetriever {
    pub fn new(
        lexical: Arc<KeywordIndex>,
        semantic: Arc<SemanticIndex>,
        fusion: FusionConfig,
        compressor: Arc<RelevanceCompressor>,
    ) -> Self {
        Self {
            lexical,
            semantic,
            fusion,
            compressor,
        }
    }

    /// Rank, fuse and compress; completes before anything is generated
    pub async fn retrieve(&self, query: &str) -> RetrievedContext {
        let lexical = async { self.lexical.search(query) };
        let (keyword_results, semantic_results) = tokio::join!(lexical, self.semantic.search(query));

        let mut degradations = Vec::new();
        let semantic_results = match semantic_results {
            Ok(results) => results,
            Err(e) => {
                let degraded = RetrievalDegraded::SemanticUnavailable {
                    reason: e.to_string(),
                };
                tracing::warn!("{}; using lexical results only", degraded);
                degradations.push(degraded);
                Vec::new()
            }
        };

        tracing::debug!(
            "Retrieved {} lexical and {} semantic candidates",
            keyword_results.len(),
            semantic_results.len()
        );

        let fused = weighted_rank_fusion(keyword_results, semantic_results, &self.fusion);
        let (results, degraded) = self.compressor.compress(query, fused).await;
        degradations.extend(degraded);

        RetrievedContext {
            results,
            degradations,
        }
    }
}
