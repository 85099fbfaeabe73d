/// Batched, bounded-concurrency embedding for index construction
use super::{EmbeddingError, EmbeddingProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Embeds many texts by splitting them into batches that run on the blocking
/// pool, at most `max_concurrent` at a time. Output order matches input order.
#[derive(Clone)]
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchEmbedder {
    /// Create a new batch embedder
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `batch_size` - Number of texts to embed in one call
    /// * `max_concurrent` - Maximum batches in flight
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Embed every text; any failed batch fails the whole call
    ///
    /// Once a batch fails, or the returned future is dropped, batches that have
    /// not started yet are skipped.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let start = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let stop = StopOnDrop(Arc::new(AtomicBool::new(false)));
        let mut tasks = JoinSet::new();
        let batch_count = texts.len().div_ceil(self.batch_size);

        for (position, batch) in texts.chunks(self.batch_size).enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;
            if stop.is_set() {
                break;
            }

            let provider = self.provider.clone();
            let batch = batch.to_vec();
            let stopped = stop.0.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                if stopped.load(Ordering::SeqCst) {
                    return (position, None);
                }
                let result = provider.embed_batch(&batch);
                if result.is_err() {
                    stopped.store(true, Ordering::SeqCst);
                }
                (position, Some(result))
            });
        }

        let mut batches: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];
        while let Some(joined) = tasks.join_next().await {
            let (position, result) = joined.map_err(|e| {
                EmbeddingError::GenerationError(format!("Embedding task failed: {}", e))
            })?;
            if let Some(result) = result {
                let batch = result?;
                debug!("Embedded batch of {} texts", batch.len());
                batches[position] = Some(batch);
            }
        }

        let embeddings: Vec<Vec<f32>> = batches.into_iter().flatten().flatten().collect();
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        info!(
            "Embedded {} texts with {} in {}ms",
            texts.len(),
            self.provider.model_name(),
            start.elapsed().as_millis()
        );

        Ok(embeddings)
    }

    /// Embed a single text off the async executor
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let provider = self.provider.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || provider.embed(&text))
            .await
            .map_err(|e| EmbeddingError::GenerationError(format!("Embedding task failed: {}", e)))?
    }
}

/// Tells queued batches to skip their work once the call is over
struct StopOnDrop(Arc<AtomicBool>);

impl StopOnDrop {
    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
