//! Cross-encoder reranking using FastEmbed

use super::{RetrievalDegraded, RetrievalResult};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Unsupported reranker model: {0}")]
    UnsupportedModel(String),

    #[error("Scorer returned {got} scores for {expected} texts")]
    ScoreCount { expected: usize, got: usize },
}

/// Pairwise query/passage relevance model
pub trait RelevanceScorer: Send + Sync {
    /// Score every text against the query; output is aligned with `texts`
    fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

/// Cross-encoder reranker backed by FastEmbed
pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        tracing::info!("Initializing reranker model: {}", model_name);

        let model = match model_name {
            "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            other => return Err(RerankError::UnsupportedModel(other.to_string())),
        };

        let init_options = RerankInitOptions::new(model).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }
}

impl RelevanceScorer for FastEmbedReranker {
    fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let results = self
            .model
            .rerank(query, texts.to_vec(), false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        // FastEmbed returns results sorted by score; put them back in input order
        let mut scores = vec![f32::NEG_INFINITY; texts.len()];
        let mut seen = 0;
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
                seen += 1;
            }
        }

        if seen != texts.len() {
            return Err(RerankError::ScoreCount {
                expected: texts.len(),
                got: seen,
            });
        }

        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Keeps the `top_n` fused candidates most relevant to the query
///
/// Without a scorer (disabled or failed to load), or when scoring fails, the
/// candidates are truncated in their fused order and the fallback is reported.
pub struct RelevanceCompressor {
    scorer: Option<Arc<dyn RelevanceScorer>>,
    top_n: usize,
}

impl RelevanceCompressor {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>, top_n: usize) -> Self {
        Self { scorer, top_n }
    }

    pub async fn compress(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
    ) -> (Vec<RetrievalResult>, Option<RetrievalDegraded>) {
        if candidates.is_empty() {
            return (candidates, None);
        }

        let Some(scorer) = self.scorer.clone() else {
            return self.fallback(candidates, "no relevance model loaded".to_string());
        };

        let texts: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
        let owned_query = query.to_string();
        let scored = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            scorer.score(&owned_query, &refs)
        })
        .await;

        let scores = match scored {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                let err = RerankError::ScoreCount {
                    expected: candidates.len(),
                    got: scores.len(),
                };
                return self.fallback(candidates, err.to_string());
            }
            Ok(Err(e)) => return self.fallback(candidates, e.to_string()),
            Err(e) => return self.fallback(candidates, format!("scoring task failed: {}", e)),
        };

        let mut rescored: Vec<RetrievalResult> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, score)| RetrievalResult { score, ..candidate })
            .collect();

        // Stable: equal relevance keeps fused order
        rescored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        rescored.truncate(self.top_n);
        for (rank, result) in rescored.iter_mut().enumerate() {
            result.rank = rank + 1;
        }

        tracing::debug!("Compressed to {} chunks", rescored.len());
        (rescored, None)
    }

    fn fallback(
        &self,
        mut candidates: Vec<RetrievalResult>,
        reason: String,
    ) -> (Vec<RetrievalResult>, Option<RetrievalDegraded>) {
        let degraded = RetrievalDegraded::RerankerUnavailable { reason };
        tracing::warn!("{}; keeping top {} fused candidates", degraded, self.top_n);

        candidates.truncate(self.top_n);
        for (rank, result) in candidates.iter_mut().enumerate() {
            result.rank = rank + 1;
        }
        (candidates, Some(degraded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    /// Scores a text by how many times it contains the query
    struct OverlapScorer;

    impl RelevanceScorer for OverlapScorer {
        fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
            Ok(texts.iter().map(|t| t.matches(query).count() as f32).collect())
        }

        fn model_name(&self) -> &str {
            "overlap"
        }
    }

    struct BrokenScorer;

    impl RelevanceScorer for BrokenScorer {
        fn score(&self, _query: &str, _texts: &[&str]) -> Result<Vec<f32>, RerankError> {
            Err(RerankError::RerankingError("model crashed".to_string()))
        }

        fn model_name(&self) -> &str {
            "broken"
        }
    }

    fn candidates(texts: &[&str]) -> Vec<RetrievalResult> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| RetrievalResult {
                chunk: Chunk {
                    text: t.to_string(),
                    source_page: 1,
                    chunk_index: i,
                    document_id: "doc".to_string(),
                },
                score: 1.0 / (i as f32 + 1.0),
                rank: i + 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_compress_reorders_by_relevance() {
        let compressor = RelevanceCompressor::new(Some(Arc::new(OverlapScorer)), 2);
        let input = candidates(&["nothing here", "tax tax", "tax tax tax", "tax"]);

        let (output, degraded) = compressor.compress("tax", input).await;

        assert!(degraded.is_none());
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].chunk.text, "tax tax tax");
        assert_eq!(output[1].chunk.text, "tax tax");
        assert_eq!(output[0].score, 3.0);
        assert_eq!(output[1].rank, 2);
    }

    #[tokio::test]
    async fn test_cardinality_is_min_of_top_n_and_input() {
        let compressor = RelevanceCompressor::new(Some(Arc::new(OverlapScorer)), 6);
        let (output, _) = compressor.compress("a", candidates(&["a", "b", "c"])).await;
        assert_eq!(output.len(), 3);
        for pair in output.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let (empty, degraded) = compressor.compress("a", Vec::new()).await;
        assert!(empty.is_empty());
        assert!(degraded.is_none());
    }

    #[tokio::test]
    async fn test_missing_scorer_truncates_in_fused_order() {
        let compressor = RelevanceCompressor::new(None, 2);
        let (output, degraded) = compressor
            .compress("tax", candidates(&["first", "second", "third"]))
            .await;

        assert_eq!(output.len(), 2);
        assert_eq!(output[0].chunk.text, "first");
        assert_eq!(output[1].chunk.text, "second");
        assert!(matches!(
            degraded,
            Some(RetrievalDegraded::RerankerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_scorer_falls_back() {
        let compressor = RelevanceCompressor::new(Some(Arc::new(BrokenScorer)), 1);
        let (output, degraded) = compressor
            .compress("tax", candidates(&["first", "second"]))
            .await;

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].chunk.text, "first");
        match degraded {
            Some(RetrievalDegraded::RerankerUnavailable { reason }) => {
                assert!(reason.contains("model crashed"))
            }
            other => panic!("unexpected degradation: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(matches!(
            FastEmbedReranker::new("not-a-reranker"),
            Err(RerankError::UnsupportedModel(_))
        ));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_rerank_basic() {
        let reranker = FastEmbedReranker::new("bge-reranker-base").unwrap();

        let query = "What is the capital of France?";
        let candidates = [
            "London is the capital of England.",
            "Paris is the capital of France.",
            "The weather is nice today.",
        ];

        let scores = reranker.score(query, &candidates).unwrap();

        assert_eq!(scores.len(), 3);
        assert!(scores[1] > scores[0]);
        assert!(scores[1] > scores[2]);
    }
}
