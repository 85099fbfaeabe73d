//! Weighted Reciprocal Rank Fusion for combining search results

use super::RetrievalResult;
use crate::config::RetrievalConfig;
use crate::document::ChunkKey;
use ahash::{HashMap, HashMapExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be non-negative and not all zero")]
    InvalidWeights,
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for keyword results
    pub lexical_weight: f32,

    /// Weight for semantic results
    pub semantic_weight: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, lexical_weight: f32, semantic_weight: f32) -> Result<Self, FusionError> {
        if lexical_weight < 0.0 || semantic_weight < 0.0 || lexical_weight + semantic_weight == 0.0 {
            return Err(FusionError::InvalidWeights);
        }

        Ok(Self {
            rrf_k,
            lexical_weight,
            semantic_weight,
        })
    }

    pub fn from_retrieval(config: &RetrievalConfig) -> Result<Self, FusionError> {
        Self::new(config.rrf_k, config.lexical_weight, config.semantic_weight)
    }
}

/// Apply weighted Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: score(chunk) = sum over all rankings of: weight / (k + rank)
///
/// Chunks are identified by (document_id, chunk_index), so a chunk found by
/// both retrievers appears once with the summed score. Equal scores keep the
/// order of first appearance, lexical list first. Returned results carry the
/// fused score and their new 1-based rank.
pub fn weighted_rank_fusion(
    lexical_results: Vec<RetrievalResult>,
    semantic_results: Vec<RetrievalResult>,
    config: &FusionConfig,
) -> Vec<RetrievalResult> {
    let mut positions: HashMap<ChunkKey, usize> = HashMap::new();
    let mut fused: Vec<RetrievalResult> = Vec::new();

    let lists = [
        (lexical_results, config.lexical_weight),
        (semantic_results, config.semantic_weight),
    ];

    for (results, weight) in lists {
        for (rank, result) in results.into_iter().enumerate() {
            let rrf_score = weight / (config.rrf_k + (rank as f32) + 1.0);
            match positions.get(&result.chunk.key()) {
                Some(&pos) => fused[pos].score += rrf_score,
                None => {
                    positions.insert(result.chunk.key(), fused.len());
                    fused.push(RetrievalResult {
                        score: rrf_score,
                        ..result
                    });
                }
            }
        }
    }

    // Stable sort: ties stay in first-appearance order
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    for (rank, result) in fused.iter_mut().enumerate() {
        result.rank = rank + 1;
    }

    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn results(ids: &[usize]) -> Vec<RetrievalResult> {
        ids.iter()
            .enumerate()
            .map(|(rank, &id)| RetrievalResult {
                chunk: Chunk {
                    text: format!("chunk {}", id),
                    source_page: 1,
                    chunk_index: id,
                    document_id: "doc".to_string(),
                },
                score: 1.0 - rank as f32 * 0.1,
                rank: rank + 1,
            })
            .collect()
    }

    fn ids(fused: &[RetrievalResult]) -> Vec<usize> {
        fused.iter().map(|r| r.chunk.chunk_index).collect()
    }

    #[test]
    fn test_rrf_basic() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();
        let fused = weighted_rank_fusion(results(&[2, 1, 4]), results(&[1, 2, 3]), &config);

        // Chunks 1 and 2 appear in both lists
        assert_eq!(fused.len(), 4);
        assert_eq!(ids(&fused)[..2].iter().filter(|&&i| i == 1 || i == 2).count(), 2);
        for (i, result) in fused.iter().enumerate() {
            assert_eq!(result.rank, i + 1);
        }
    }

    #[test]
    fn test_rrf_exact_scores() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();
        let fused = weighted_rank_fusion(results(&[7]), results(&[7]), &config);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_rrf_weighted() {
        // Prefer semantic
        let config = FusionConfig::new(60.0, 0.3, 0.7).unwrap();
        let fused = weighted_rank_fusion(results(&[2]), results(&[1]), &config);

        assert_eq!(ids(&fused), vec![1, 2]);
    }

    #[test]
    fn test_ties_keep_lexical_first() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();
        let fused = weighted_rank_fusion(results(&[5, 6]), results(&[8, 9]), &config);

        assert_eq!(ids(&fused), vec![5, 8, 6, 9]);
    }

    #[test]
    fn test_found_by_both_beats_found_by_one() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();

        // Chunk 3 at rank 2 in both lists; chunks 1 and 2 top one list each
        let fused = weighted_rank_fusion(results(&[1, 3]), results(&[2, 3]), &config);
        assert_eq!(fused[0].chunk.chunk_index, 3);

        // Same individual rank, one list only: strictly lower score
        let single = weighted_rank_fusion(results(&[1, 3]), results(&[2, 4]), &config);
        let both_score = fused[0].score;
        let single_score = single
            .iter()
            .find(|r| r.chunk.chunk_index == 3)
            .map(|r| r.score)
            .unwrap();
        assert!(both_score > single_score);
    }

    #[test]
    fn test_dedup_by_document_and_index() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();
        let mut other_doc = results(&[1]);
        other_doc[0].chunk.document_id = "other".to_string();

        let fused = weighted_rank_fusion(results(&[1]), other_doc, &config);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_invalid_weights() {
        assert!(FusionConfig::new(60.0, -0.1, 0.5).is_err());
        assert!(FusionConfig::new(60.0, 0.0, 0.0).is_err());
        assert!(FusionConfig::new(60.0, 0.0, 1.0).is_ok());
    }

    #[test]
    fn test_one_empty_list() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();
        let fused = weighted_rank_fusion(results(&[4, 2]), Vec::new(), &config);
        assert_eq!(ids(&fused), vec![4, 2]);
    }
}
