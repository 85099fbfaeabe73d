//! Deterministic stand-ins for the embedding, reranking and generation models
#![allow(dead_code)]

use futures::StreamExt;
use pagechat::config::Config;
use pagechat::embedding::{EmbeddingError, EmbeddingProvider};
use pagechat::generation::{FragmentStream, GenerationError, Generator, FALLBACK_PHRASE};
use pagechat::retrieval::{RelevanceScorer, RerankError};
use pagechat::RagEngine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DIM: usize = 64;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn slot(word: &str) -> usize {
    let hash = word
        .bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
    (hash % DIM as u64) as usize
}

/// Hashed bag-of-words embeddings
///
/// Any text containing `fail_marker` fails to embed, and every call is counted.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    pub fail_marker: Option<String>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_marker: None,
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_marker: Some(marker.to_string()),
        }
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::GenerationError("embedding backend down".to_string()));
            }
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut vector = vec![0.0f32; DIM + 1];
        for word in words(text) {
            vector[slot(&word)] += 1.0;
        }
        vector[DIM] = 0.01;
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIM + 1
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

/// Relevance = number of query words found in the passage
pub struct OverlapScorer;

impl RelevanceScorer for OverlapScorer {
    fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        let query_words: Vec<String> = words(query).collect();
        Ok(texts
            .iter()
            .map(|text| {
                let text_words: Vec<String> = words(text).collect();
                query_words
                    .iter()
                    .filter(|w| text_words.contains(w))
                    .count() as f32
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "overlap"
    }
}

fn section<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    let Some(from) = prompt.find(start).map(|i| i + start.len()) else {
        return "";
    };
    let rest = &prompt[from..];
    &rest[..rest.find(end).unwrap_or(rest.len())]
}

/// Request and excerpts as rendered by the default template
pub fn request_and_excerpts(prompt: &str) -> (String, String) {
    (
        section(prompt, "User request: ", "\n").to_string(),
        section(
            prompt,
            "Excerpts from the uploaded document:\n",
            "\n\nBefore answering:",
        )
        .to_string(),
    )
}

/// Answers only from the excerpts, falling back like the template asks
///
/// Prompts are recorded; fragments are emitted with a short delay.
pub struct GroundedGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub delay: Duration,
}

impl GroundedGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            delay: Duration::from_millis(1),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for GroundedGenerator {
    fn generate_stream(&self, prompt: String) -> FragmentStream {
        self.prompts.lock().unwrap().push(prompt.clone());

        let (request, excerpts) = request_and_excerpts(&prompt);
        let excerpt_words: Vec<String> = words(&excerpts).collect();
        let supporting: Vec<String> = words(&request)
            .filter(|w| w.len() > 3 && excerpt_words.contains(w))
            .collect();

        let fragments: Vec<String> = if supporting.is_empty() {
            vec!["## Answer\n".to_string(), FALLBACK_PHRASE.to_string()]
        } else {
            vec![
                "## Answer\n".to_string(),
                "The document discusses ".to_string(),
                supporting.join(", "),
                ".".to_string(),
            ]
        };

        let delay = self.delay;
        Box::pin(futures::stream::iter(fragments).then(move |fragment| async move {
            tokio::time::sleep(delay).await;
            Ok::<String, GenerationError>(fragment)
        }))
    }

    fn model_name(&self) -> &str {
        "grounded"
    }
}

/// Emits one fragment, then the connection drops
pub struct BrokenGenerator;

impl Generator for BrokenGenerator {
    fn generate_stream(&self, _prompt: String) -> FragmentStream {
        Box::pin(futures::stream::iter(vec![
            Ok("partial ".to_string()),
            Err(GenerationError::Interrupted("connection reset".to_string())),
        ]))
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

pub const TOPICS: [&str; 10] = [
    "irrigation",
    "harvest",
    "fertilizer",
    "pesticide",
    "livestock",
    "greenhouse",
    "compost",
    "orchard",
    "vineyard",
    "apiary",
];

/// A paragraph of 500+ characters on one topic, without line breaks
pub fn paragraph(page: usize, index: usize, topic: &str) -> String {
    let sentence = format!(
        "Section {}.{} explains the {} schedule and the records kept for it. ",
        page, index, topic
    );
    let mut text = String::new();
    while text.len() < 500 {
        text.push_str(&sentence);
    }
    text.trim_end().to_string()
}

/// Ten pages separated by form feeds: eight of four paragraphs, two of five
pub fn farm_manual() -> String {
    (0..10)
        .map(|page| {
            let paragraphs = if page < 8 { 4 } else { 5 };
            (0..paragraphs)
                .map(|i| paragraph(page + 1, i + 1, TOPICS[page]))
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .collect::<Vec<_>>()
        .join("\x0C")
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn engine_with(
    provider: Arc<HashEmbedder>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    generator: Arc<dyn Generator>,
) -> RagEngine {
    RagEngine::new(Config::default(), provider, scorer, generator).unwrap()
}

pub fn engine(generator: Arc<dyn Generator>) -> RagEngine {
    engine_with(
        Arc::new(HashEmbedder::new()),
        Some(Arc::new(OverlapScorer)),
        generator,
    )
}
