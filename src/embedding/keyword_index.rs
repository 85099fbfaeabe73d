/// BM25 keyword index over whitespace-tokenized chunks
use crate::document::{is_text_whitespace, Chunk};
use crate::retrieval::RetrievalResult;
use ahash::{HashMap, HashMapExt};
use std::sync::Arc;

/// BM25-Okapi parameters
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    /// Term frequency saturation
    pub k1: f64,
    /// Length normalization
    pub b: f64,
    /// Floor for negative IDF values, as a fraction of the average IDF
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// In-memory BM25-Okapi index
///
/// Tokenization is a plain whitespace split with no case folding, stemming or
/// stopword removal. Terms that occur in more than half the chunks would get a
/// negative IDF; those are floored at `epsilon * average_idf`.
pub struct KeywordIndex {
    chunks: Arc<[Chunk]>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
    params: Bm25Params,
    k: usize,
}

pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_text_whitespace).filter(|token| !token.is_empty())
}

impl KeywordIndex {
    /// Build the index; `k` is the number of results returned per search
    pub fn build(chunks: Arc<[Chunk]>, k: usize) -> Self {
        Self::with_params(chunks, k, Bm25Params::default())
    }

    pub fn with_params(chunks: Arc<[Chunk]>, k: usize, params: Bm25Params) -> Self {
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        // Document frequencies, in first-seen order so the IDF average is reproducible
        let mut vocabulary: Vec<String> = Vec::new();
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut total_tokens = 0usize;

        for chunk in chunks.iter() {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            let mut first_seen: Vec<&str> = Vec::new();
            let mut len = 0;

            for token in tokenize(&chunk.text) {
                len += 1;
                let count = freqs.entry(token.to_string()).or_insert(0);
                if *count == 0 {
                    first_seen.push(token);
                }
                *count += 1;
            }

            for token in first_seen {
                let df = doc_freqs.entry(token.to_string()).or_insert(0);
                if *df == 0 {
                    vocabulary.push(token.to_string());
                }
                *df += 1;
            }

            total_tokens += len;
            doc_lens.push(len);
            term_freqs.push(freqs);
        }

        let corpus_size = chunks.len() as f64;
        let avg_doc_len = if chunks.is_empty() {
            0.0
        } else {
            total_tokens as f64 / corpus_size
        };

        let mut idf = HashMap::with_capacity(vocabulary.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for term in &vocabulary {
            let df = doc_freqs.get(term).copied().unwrap_or(0) as f64;
            let value = (corpus_size - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }

        if !vocabulary.is_empty() {
            let floor = params.epsilon * (idf_sum / vocabulary.len() as f64);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        tracing::debug!(
            "Built keyword index: {} chunks, {} terms, avg length {:.1}",
            chunks.len(),
            vocabulary.len(),
            avg_doc_len
        );

        Self {
            chunks,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
            params,
            k,
        }
    }

    /// BM25 score of every chunk for the query, in chunk order
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        let mut scores = vec![0.0; self.chunks.len()];

        for term in tokenize(query) {
            let idf = self.idf.get(term).copied().unwrap_or(0.0);
            if idf == 0.0 {
                continue;
            }

            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = 1.0 - b + b * self.doc_lens[i] as f64 / self.avg_doc_len;
                scores[i] += idf * (tf * (k1 + 1.0) / (tf + k1 * norm));
            }
        }

        scores
    }

    /// Top-k chunks by BM25 score, ties broken by chunk order
    ///
    /// Always returns `min(k, len)` results, including zero-scored chunks.
    pub fn search(&self, query: &str) -> Vec<RetrievalResult> {
        let scores = self.scores(query);

        let mut order: Vec<usize> = (0..scores.len()).collect();
        // Stable sort keeps build order among equal scores
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        order
            .into_iter()
            .take(self.k)
            .enumerate()
            .map(|(rank, i)| RetrievalResult {
                chunk: self.chunks[i].clone(),
                score: scores[i] as f32,
                rank: rank + 1,
            })
            .collect()
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Get the number of chunks in the index
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
