//! Pagechat - Session-scoped document question answering
//!
//! Upload a document, then chat with it. Each upload becomes a session with
//! its own BM25 and HNSW indexes; every question is answered from chunks
//! retrieved by both, fused, reranked, and streamed back from a local LLM.

pub mod chain;
pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod retrieval;
pub mod session;

pub use engine::{IndexSummary, IndexingError, RagEngine};
pub use error::{PagechatError, Result};
