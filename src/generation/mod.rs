//! Answer generation
//!
//! A [`Generator`] turns a fully assembled prompt into a lazy stream of text
//! fragments. [`OllamaGenerator`] talks to a local Ollama server;
//! [`PromptBuilder`] renders the grounded-answer template.

mod ollama;
mod prompt;

pub use ollama::OllamaGenerator;
pub use prompt::{
    builtin_template, PromptBuilder, BUILTIN_TEMPLATES, DEFAULT_TEMPLATE, FALLBACK_PHRASE,
    LESSON_PLAN_TEMPLATE,
};

use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Answer stream interrupted: {0}")]
    Interrupted(String),

    #[error("Invalid response from generation backend: {0}")]
    InvalidResponse(String),

    #[error("Generation backend returned an error: {0}")]
    Upstream(String),
}

/// Lazy, finite sequence of answer fragments
///
/// Dropping the stream abandons the upstream request.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Streaming text generation capability
pub trait Generator: Send + Sync {
    /// Start generating; nothing is requested until the stream is first polled
    fn generate_stream(&self, prompt: String) -> FragmentStream;

    fn model_name(&self) -> &str;
}
