//! Retrieval-augmented chat engine
//!
//! [`RagEngine`] is the boundary the serving layer talks to:
//! `index_document`, `chat`, `list_sessions` and `delete_session`. It owns
//! the models shared by every session and the [`SessionStore`].

use crate::chain::{ChainState, ChatError, ChatStream, ConversationalChain, Message};
use crate::config::{Config, ConfigValidator};
use crate::document::{load_document, Chunk, ParseError, Segmenter};
use crate::embedding::{
    BatchEmbedder, EmbeddingError, EmbeddingProvider, FastEmbedProvider, KeywordIndex, VectorStore,
};
use crate::error::{PagechatError, Result};
use crate::generation::{Generator, OllamaGenerator, PromptBuilder};
use crate::retrieval::{
    FastEmbedReranker, FusionConfig, HybridRetriever, RelevanceCompressor, RelevanceScorer,
    SemanticError, SemanticIndex,
};
use crate::session::{Session, SessionNotFound, SessionStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No text chunks could be produced from {document}")]
    NoChunks { document: String },

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Embedding model error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Semantic index build failed: {0}")]
    Semantic(#[from] SemanticError),

    #[error("Indexing task failed: {0}")]
    Task(String),
}

/// What an upload produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub session_id: String,
    pub document_name: String,
    pub page_count: usize,
    pub chunk_count: usize,
}

impl IndexSummary {
    /// `(page_count, chunk_count)`
    pub fn counts(&self) -> (usize, usize) {
        (self.page_count, self.chunk_count)
    }
}

impl From<&Session> for IndexSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            document_name: session.document_name.clone(),
            page_count: session.page_count,
            chunk_count: session.chunk_count,
        }
    }
}

pub struct RagEngine {
    config: Config,
    segmenter: Segmenter,
    embedder: BatchEmbedder,
    fusion: FusionConfig,
    compressor: Arc<RelevanceCompressor>,
    generator: Arc<dyn Generator>,
    prompt: Arc<PromptBuilder>,
    vectors: Arc<VectorStore>,
    sessions: SessionStore,
}

impl RagEngine {
    /// Assemble an engine from already-loaded models
    ///
    /// `scorer` is optional: without it, compression truncates fused results.
    pub fn new(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let fusion = FusionConfig::from_retrieval(&config.retrieval)
            .map_err(|e| PagechatError::Config(e.to_string()))?;
        let prompt = PromptBuilder::from_config(&config)?;
        let sessions = SessionStore::new(config.sessions.max_sessions, config.sessions.idle_ttl()?);

        Ok(Self {
            segmenter: Segmenter::from_config(&config.chunking),
            embedder: BatchEmbedder::new(
                provider,
                config.embedding.batch_size,
                config.embedding.max_concurrent,
            ),
            fusion,
            compressor: Arc::new(RelevanceCompressor::new(scorer, config.retrieval.top_n)),
            generator,
            prompt: Arc::new(prompt),
            vectors: Arc::new(VectorStore::new()),
            sessions,
            config,
        })
    }

    /// Load the configured FastEmbed models and Ollama backend
    ///
    /// A reranker that fails to load is logged and left out.
    pub fn from_config(config: Config) -> Result<Self> {
        let provider = FastEmbedProvider::new(&config.embedding.model).map_err(IndexingError::from)?;

        let scorer: Option<Arc<dyn RelevanceScorer>> = if config.reranker.enabled {
            match FastEmbedReranker::new(&config.reranker.model) {
                Ok(reranker) => Some(Arc::new(reranker)),
                Err(e) => {
                    tracing::warn!("Reranker unavailable, results will not be reranked: {}", e);
                    None
                }
            }
        } else {
            tracing::info!("Reranking disabled in configuration");
            None
        };

        let generator = OllamaGenerator::new(&config.llm)?;

        Self::new(config, Arc::new(provider), scorer, Arc::new(generator))
    }

    /// Fresh 8-character session id not used by a live session
    pub async fn new_session_id(&self) -> String {
        loop {
            let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
            if !self.sessions.contains(&id).await {
                return id;
            }
        }
    }

    /// Load, segment and index a document under `session_id`
    ///
    /// Both indexes are built concurrently. On any failure, or if the future
    /// is dropped, nothing is stored and no vector collection is left behind.
    pub async fn index_document(
        &self,
        path: &Path,
        session_id: &str,
    ) -> std::result::Result<IndexSummary, IndexingError> {
        if session_id.trim().is_empty() {
            return Err(IndexingError::InvalidSessionId(session_id.to_string()));
        }

        let start = std::time::Instant::now();
        let owned_path: PathBuf = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || load_document(&owned_path))
            .await
            .map_err(|e| IndexingError::Task(e.to_string()))??;

        let chunks: Arc<[Chunk]> = self.segmenter.segment(&document).into();
        if chunks.is_empty() {
            return Err(IndexingError::NoChunks {
                document: document.name,
            });
        }
        tracing::debug!(
            "Segmented {} into {} chunks",
            document.name,
            chunks.len()
        );

        let k = self.config.retrieval.k;
        let lexical_chunks = chunks.clone();
        let lexical = tokio::task::spawn_blocking(move || KeywordIndex::build(lexical_chunks, k));
        let semantic = SemanticIndex::build(
            session_id,
            chunks.clone(),
            self.embedder.clone(),
            self.vectors.clone(),
            &self.config.retrieval,
        );

        // Nothing is published before `sessions.create`, so a failed or
        // abandoned upload leaves no collection behind
        let (lexical, semantic) = tokio::join!(lexical, semantic);
        let semantic = Arc::new(semantic?);
        let lexical = Arc::new(lexical.map_err(|e| IndexingError::Task(e.to_string()))?);

        let retriever = Arc::new(HybridRetriever::new(
            lexical.clone(),
            semantic.clone(),
            self.fusion.clone(),
            self.compressor.clone(),
        ));
        let chain = ConversationalChain::new(retriever, self.generator.clone(), self.prompt.clone());
        let session = Session::new(
            session_id,
            document.name.clone(),
            document.page_count(),
            &lexical,
            semantic,
            chain,
        );
        let session = self.sessions.create(session).await;

        tracing::info!(
            "Indexed {} in {:.2}s: {} pages, {} chunks",
            session.document_name,
            start.elapsed().as_secs_f64(),
            session.page_count,
            session.chunk_count
        );

        Ok(IndexSummary::from(session.as_ref()))
    }

    /// Start a chat turn against a session
    ///
    /// Fails with `SessionNotFound` before any retrieval runs.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
    ) -> std::result::Result<ChatStream, ChatError> {
        let session = self.sessions.get(session_id).await?;
        tracing::debug!("Chat on session {}: {:?}", session_id, message);
        session.chain().stream(message)
    }

    pub async fn list_sessions(&self) -> Vec<String> {
        self.sessions.list_ids().await
    }

    /// Idempotent; returns whether a session was removed
    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.sessions.delete(session_id).await
    }

    pub async fn session_info(
        &self,
        session_id: &str,
    ) -> std::result::Result<IndexSummary, SessionNotFound> {
        let session = self.sessions.get(session_id).await?;
        Ok(IndexSummary::from(session.as_ref()))
    }

    pub async fn history(
        &self,
        session_id: &str,
    ) -> std::result::Result<Vec<Message>, SessionNotFound> {
        let session = self.sessions.get(session_id).await?;
        Ok(session.chain().history().await)
    }

    /// Where the session's current chat turn is, `Idle` between turns
    pub async fn chat_state(
        &self,
        session_id: &str,
    ) -> std::result::Result<ChainState, SessionNotFound> {
        let session = self.sessions.get(session_id).await?;
        Ok(session.chain().state())
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vectors
    }
}
