//! Session management
//!
//! A session owns the lexical and semantic indexes of one uploaded document
//! and the conversation held over it. The [`SessionStore`] is the process-wide
//! registry of live sessions: it upserts, evicts the least recently used
//! session beyond its capacity, expires idle sessions, and releases the vector
//! collection of every session it drops.

use crate::chain::ConversationalChain;
use crate::embedding::KeywordIndex;
use crate::retrieval::SemanticIndex;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Session expired or unknown: {id}")]
pub struct SessionNotFound {
    pub id: String,
}

impl SessionNotFound {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One uploaded document with its indexes and conversation
pub struct Session {
    pub id: String,
    pub document_name: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    semantic_index: Arc<SemanticIndex>,
    chain: ConversationalChain,
    opened: Instant,
    /// Milliseconds after `opened` of the last access
    last_active_ms: AtomicU64,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        document_name: impl Into<String>,
        page_count: usize,
        lexical_index: &KeywordIndex,
        semantic_index: Arc<SemanticIndex>,
        chain: ConversationalChain,
    ) -> Self {
        Self {
            id: id.into(),
            document_name: document_name.into(),
            page_count,
            chunk_count: lexical_index.len(),
            created_at: Utc::now(),
            semantic_index,
            chain,
            opened: Instant::now(),
            last_active_ms: AtomicU64::new(0),
        }
    }

    pub fn chain(&self) -> &ConversationalChain {
        &self.chain
    }

    pub fn semantic_index(&self) -> &Arc<SemanticIndex> {
        &self.semantic_index
    }

    /// Mark the session as used now
    pub fn touch(&self) {
        let elapsed = self.opened.elapsed().as_millis() as u64;
        self.last_active_ms.fetch_max(elapsed, Ordering::SeqCst);
    }

    pub fn last_active(&self) -> Instant {
        self.opened + Duration::from_millis(self.last_active_ms.load(Ordering::SeqCst))
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active().elapsed()
    }

    /// Publish this session's vector collection
    async fn register(&self) {
        self.semantic_index.register().await
    }

    /// Drop this session's vector collection
    pub async fn release(&self) -> bool {
        self.semantic_index.release().await
    }
}

/// Registry of live sessions
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    idle_ttl: Option<Duration>,
}

impl SessionStore {
    /// `max_sessions` is clamped to at least one; `None` disables idle expiry
    pub fn new(max_sessions: usize, idle_ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        self.idle_ttl
            .map(|ttl| session.idle_for() > ttl)
            .unwrap_or(false)
    }

    /// Insert a session, replacing any live session with the same id
    ///
    /// The session's collection is registered under the store lock, so a
    /// session is live exactly when its collection is. Replaced, expired and
    /// evicted sessions have their collections released after the lock is
    /// dropped.
    pub async fn create(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut dropped = Vec::new();

        {
            let mut sessions = self.sessions.write().await;

            let expired: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| self.is_expired(s))
                .map(|(id, _)| id.clone())
                .collect();
            for id in expired {
                if let Some(old) = sessions.remove(&id) {
                    tracing::info!("Session {} expired after idle timeout", id);
                    dropped.push(old);
                }
            }

            session.register().await;
            if let Some(previous) = sessions.insert(session.id.clone(), session.clone()) {
                tracing::warn!("Replacing existing session {}", previous.id);
                dropped.push(previous);
            }

            while sessions.len() > self.max_sessions {
                let lru = sessions
                    .values()
                    .filter(|s| s.id != session.id)
                    .min_by_key(|s| s.last_active())
                    .map(|s| s.id.clone());
                let Some(lru) = lru else { break };
                if let Some(evicted) = sessions.remove(&lru) {
                    tracing::info!("Evicted least recently used session {}", lru);
                    dropped.push(evicted);
                }
            }
        }

        for old in dropped {
            old.release().await;
        }

        tracing::info!(
            "Session {} created for {} ({} pages, {} chunks)",
            session.id,
            session.document_name,
            session.page_count,
            session.chunk_count
        );
        session
    }

    /// Look up a live session and mark it used
    pub async fn get(&self, id: &str) -> Result<Arc<Session>, SessionNotFound> {
        let found = self.sessions.read().await.get(id).cloned();
        let session = found.ok_or_else(|| SessionNotFound::new(id))?;

        if self.is_expired(&session) {
            let removed = {
                let mut sessions = self.sessions.write().await;
                match sessions.get(id) {
                    Some(current) if Arc::ptr_eq(current, &session) => sessions.remove(id),
                    _ => None,
                }
            };
            if let Some(expired) = removed {
                tracing::info!("Session {} expired after idle timeout", id);
                expired.release().await;
            }
            return Err(SessionNotFound::new(id));
        }

        session.touch();
        Ok(session)
    }

    /// Remove a session; returns false if it was not there
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.release().await;
                tracing::info!("Session {} deleted", id);
                true
            }
            None => {
                tracing::debug!("Delete of unknown session {} ignored", id);
                false
            }
        }
    }

    /// Ids of live sessions, sorted
    pub async fn list_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .values()
            .filter(|s| !self.is_expired(s))
            .map(|s| s.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::document::Chunk;
    use crate::embedding::{BatchEmbedder, EmbeddingError, EmbeddingProvider, VectorStore};
    use crate::generation::{FragmentStream, Generator, PromptBuilder};
    use crate::retrieval::{FusionConfig, HybridRetriever, RelevanceCompressor};

    struct LengthProvider;

    impl EmbeddingProvider for LengthProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    struct SilentGenerator;

    impl Generator for SilentGenerator {
        fn generate_stream(&self, _prompt: String) -> FragmentStream {
            Box::pin(futures::stream::empty())
        }

        fn model_name(&self) -> &str {
            "silent"
        }
    }

    async fn session(id: &str, vectors: Arc<VectorStore>) -> Session {
        let config = RetrievalConfig::default();
        let chunks: Arc<[Chunk]> = vec![Chunk {
            text: format!("document for {}", id),
            source_page: 1,
            chunk_index: 0,
            document_id: id.to_string(),
        }]
        .into();

        let lexical = Arc::new(KeywordIndex::build(chunks.clone(), config.k));
        let semantic = Arc::new(
            SemanticIndex::build(
                id,
                chunks,
                BatchEmbedder::new(Arc::new(LengthProvider), 8, 1),
                vectors,
                &config,
            )
            .await
            .unwrap(),
        );
        let retriever = Arc::new(HybridRetriever::new(
            lexical.clone(),
            semantic.clone(),
            FusionConfig::from_retrieval(&config).unwrap(),
            Arc::new(RelevanceCompressor::new(None, config.top_n)),
        ));
        let chain = ConversationalChain::new(
            retriever,
            Arc::new(SilentGenerator),
            Arc::new(PromptBuilder::default()),
        );

        Session::new(id, format!("{}.pdf", id), 1, &lexical, semantic, chain)
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let vectors = Arc::new(VectorStore::new());
        let store = SessionStore::new(8, None);

        store.create(session("a1", vectors.clone()).await).await;
        let found = store.get("a1").await.unwrap();
        assert_eq!(found.document_name, "a1.pdf");
        assert_eq!(found.chunk_count, 1);

        assert!(store.delete("a1").await);
        assert!(!vectors.contains("temp_a1").await);
        assert!(matches!(
            store.get("a1").await,
            Err(e) if e == SessionNotFound::new("a1")
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let vectors = Arc::new(VectorStore::new());
        let store = SessionStore::new(8, None);
        store.create(session("keep", vectors.clone()).await).await;

        assert!(!store.delete("missing").await);
        assert!(!store.delete("missing").await);
        assert_eq!(store.list_ids().await, vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn test_create_replaces_and_keeps_new_collection() {
        let vectors = Arc::new(VectorStore::new());
        let store = SessionStore::new(8, None);

        store.create(session("dup", vectors.clone()).await).await;
        let second = store.create(session("dup", vectors.clone()).await).await;

        assert_eq!(store.len().await, 1);
        assert!(Arc::ptr_eq(&store.get("dup").await.unwrap(), &second));
        // Releasing the replaced session must not drop its successor's collection
        assert!(second.semantic_index().is_registered().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_creates_keep_winner_registered() {
        let vectors = Arc::new(VectorStore::new());
        let store = Arc::new(SessionStore::new(8, None));

        for _ in 0..20 {
            let mut handles = Vec::new();
            for _ in 0..3 {
                let session = session("race", vectors.clone()).await;
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.create(session).await;
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            let live = store.get("race").await.unwrap();
            assert!(live.semantic_index().is_registered().await);
            assert_eq!(vectors.collection_names().await, vec!["temp_race"]);
        }
    }

    #[tokio::test]
    async fn test_collection_published_only_on_create() {
        let vectors = Arc::new(VectorStore::new());
        let store = SessionStore::new(8, None);

        let pending = session("later", vectors.clone()).await;
        assert!(vectors.is_empty().await);

        let live = store.create(pending).await;
        assert!(live.semantic_index().is_registered().await);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let vectors = Arc::new(VectorStore::new());
        let store = SessionStore::new(2, None);

        store.create(session("s1", vectors.clone()).await).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.create(session("s2", vectors.clone()).await).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get("s1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.create(session("s3", vectors.clone()).await).await;

        assert_eq!(store.list_ids().await, vec!["s1".to_string(), "s3".to_string()]);
        assert!(!vectors.contains("temp_s2").await);
        assert_eq!(vectors.len().await, 2);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let vectors = Arc::new(VectorStore::new());
        let store = SessionStore::new(8, Some(Duration::from_millis(30)));

        store.create(session("old", vectors.clone()).await).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.list_ids().await.is_empty());
        assert!(store.get("old").await.is_err());
        assert!(!vectors.contains("temp_old").await);
    }
}
