//! Conversational chain
//!
//! One chain per session. A chat turn moves the chain through
//! `Idle -> Retrieving -> Generating -> Streaming -> Idle`; turns on the same
//! chain are serialised, and a turn is committed to the conversation only when
//! its answer stream completes.

use crate::document::Chunk;
use crate::generation::{GenerationError, Generator, PromptBuilder};
use crate::retrieval::HybridRetriever;
use crate::session::SessionNotFound;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    SessionNotFound(#[from] SessionNotFound),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Message cannot be empty")]
    EmptyMessage,
}

/// Where a chain is within a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainState {
    Idle,
    Retrieving,
    Generating,
    Streaming,
}

impl ChainState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Retrieving,
            2 => Self::Generating,
            3 => Self::Streaming,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

/// One completed chat call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub retrieved_chunks: Vec<Chunk>,
    pub answer: String,
}

/// Append-only record of a session's completed turns
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Flattened user/assistant messages in call order
    pub fn messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|turn| {
                [
                    Message {
                        role: Role::User,
                        text: turn.query.clone(),
                    },
                    Message {
                        role: Role::Assistant,
                        text: turn.answer.clone(),
                    },
                ]
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Resets the chain to `Idle` however the turn ends
struct StateGuard(Arc<AtomicU8>);

impl StateGuard {
    fn enter(state: Arc<AtomicU8>, initial: ChainState) -> Self {
        state.store(initial as u8, Ordering::SeqCst);
        Self(state)
    }

    fn set(&self, next: ChainState) {
        self.0.store(next as u8, Ordering::SeqCst);
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.0.store(ChainState::Idle as u8, Ordering::SeqCst);
    }
}

pub struct ConversationalChain {
    retriever: Arc<HybridRetriever>,
    generator: Arc<dyn Generator>,
    prompt: Arc<PromptBuilder>,
    conversation: Arc<RwLock<Conversation>>,
    turn_lock: Arc<Mutex<()>>,
    state: Arc<AtomicU8>,
}

impl ConversationalChain {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        generator: Arc<dyn Generator>,
        prompt: Arc<PromptBuilder>,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompt,
            conversation: Arc::new(RwLock::new(Conversation::default())),
            turn_lock: Arc::new(Mutex::new(())),
            state: Arc::new(AtomicU8::new(ChainState::Idle as u8)),
        }
    }

    /// Start a chat turn
    ///
    /// Nothing runs until the returned stream is polled. Retrieval completes
    /// before generation is requested. Dropping the stream cancels the turn
    /// and leaves the conversation untouched.
    pub fn stream(&self, query: impl Into<String>) -> Result<ChatStream, ChatError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let retriever = self.retriever.clone();
        let generator = self.generator.clone();
        let prompt = self.prompt.clone();
        let conversation = self.conversation.clone();
        let turn_lock = self.turn_lock.clone();
        let state = self.state.clone();
        let sources = Arc::new(OnceLock::new());
        let sources_slot = sources.clone();

        let inner = try_stream! {
            let _turn = turn_lock.lock_owned().await;
            let guard = StateGuard::enter(state, ChainState::Retrieving);

            let context = retriever.retrieve(&query).await;
            if context.is_degraded() {
                tracing::debug!("Answering from degraded retrieval: {:?}", context.degradations);
            }
            let retrieved = context.chunks();
            let _ = sources_slot.set(retrieved.clone());

            guard.set(ChainState::Generating);
            let rendered = {
                let conversation = conversation.read().await;
                prompt.build(&query, &context.results, conversation.turns())
            };
            tracing::debug!(
                "Generating with {} context chunks ({} chars of prompt)",
                context.results.len(),
                rendered.len()
            );

            let mut fragments = generator.generate_stream(rendered);
            let mut answer = String::new();
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                if answer.is_empty() {
                    guard.set(ChainState::Streaming);
                }
                answer.push_str(&fragment);
                yield fragment;
            }

            conversation.write().await.push(ConversationTurn {
                query,
                retrieved_chunks: retrieved,
                answer,
            });
        };

        Ok(ChatStream {
            inner: Box::pin(inner),
            sources,
        })
    }

    pub fn state(&self) -> ChainState {
        ChainState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub async fn history(&self) -> Vec<Message> {
        self.conversation.read().await.messages()
    }

    pub async fn turns(&self) -> Vec<ConversationTurn> {
        self.conversation.read().await.turns().to_vec()
    }
}

/// Answer fragments of one chat turn, in order
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>,
    sources: Arc<OnceLock<Vec<Chunk>>>,
}

impl ChatStream {
    /// Chunks the answer is grounded on; set once retrieval has finished
    pub fn sources(&self) -> Option<&[Chunk]> {
        self.sources.get().map(Vec::as_slice)
    }

    /// Drain the stream into the full answer
    pub async fn collect_answer(mut self) -> Result<String, ChatError> {
        let mut answer = String::new();
        while let Some(fragment) = self.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}

impl Stream for ChatStream {
    type Item = Result<String, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
