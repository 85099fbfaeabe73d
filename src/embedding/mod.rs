//! Embedding & Indexing
//!
//! Architecture:
//! - EmbeddingProvider trait for abstraction, FastEmbedProvider for local models
//! - BatchEmbedder for bounded-concurrency embedding during upload
//! - KeywordIndex: BM25 over whitespace tokens
//! - VectorIndex: HNSW over chunk embeddings, registered per session in a VectorStore

mod batch;
mod keyword_index;
mod provider;
mod vector_index;

pub use batch::BatchEmbedder;
pub use keyword_index::{Bm25Params, KeywordIndex};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, SUPPORTED_MODELS};
pub use vector_index::{HnswParams, SearchResult, VectorIndex, VectorIndexError, VectorStore};
