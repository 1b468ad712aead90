//! Inference providers: text embedding and streamed chat completion.
//!
//! Both are opaque collaborators behind object-safe traits. The engine holds
//! them as `Option<Arc<dyn …>>`; `None` means "not configured" and the engine
//! degrades instead of failing. [`create_embedder`] and [`create_chat_model`]
//! build them from configuration.

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ChatConfig, EmbeddingConfig};
use crate::stream::TokenSink;

/// Errors from an inference provider call.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("stream ended before the model finished")]
    Truncated,
}

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;

    /// Identifier recorded alongside stored vectors.
    fn model(&self) -> &str;
}

/// One chat turn: a system message, a user message, and a token budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// How a token stream ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The model finished its answer.
    Completed,
    /// The consumer went away; generation was abandoned.
    Cancelled,
}

/// Streams a completion into a [`TokenSink`].
///
/// Implementations must stop promptly, releasing the upstream request, once
/// the sink reports closed.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        sink: &TokenSink,
    ) -> Result<StreamEnd, InferenceError>;
}

/// Create the configured embedder, or `None` when embeddings are disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "openai" => Ok(Some(Arc::new(openai::OpenAiEmbedder::new(config)?))),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: openai, none"),
    }
}

/// Create the configured chat model, or `None` when chat is disabled.
pub fn create_chat_model(config: &ChatConfig) -> anyhow::Result<Option<Arc<dyn ChatModel>>> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "openai" => Ok(Some(Arc::new(openai::OpenAiChat::new(config)?))),
        other => anyhow::bail!("unknown chat provider: {other}. Supported: openai, none"),
    }
}
