#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use journal_rag::config::Config;
use journal_rag::db::Database;
use journal_rag::inference::{ChatModel, ChatRequest, Embedder, InferenceError, StreamEnd};
use journal_rag::store::types::NewEntry;
use journal_rag::stream::{ChatEvent, TokenSink};
use journal_rag::Engine;
use tokio::sync::mpsc;

/// Vocabulary for [`KeywordEmbedder`]; one dimension per word.
const VOCAB: &[&str] = &[
    "alice", "hiking", "went", "go", "where", "mountain", "lake", "work", "meeting", "dog",
    "river", "coffee", "family", "dinner", "rain", "book",
];

/// Build an engine over a fresh in-memory database with default config.
pub fn test_engine(
    embedder: Option<Arc<dyn Embedder>>,
    chat: Option<Arc<dyn ChatModel>>,
) -> Engine {
    Engine::new(
        Database::open_in_memory().unwrap(),
        embedder,
        chat,
        Config::default(),
    )
}

pub fn entry(user: &str, date: &str, body: &str) -> NewEntry {
    NewEntry {
        user_id: user.into(),
        title: String::new(),
        body: body.into(),
        created_at: date.into(),
        mood: None,
        tags: Vec::new(),
    }
}

/// Deterministic bag-of-words embedding over [`VOCAB`], with a constant bias
/// dimension so no vector is all zeros.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; VOCAB.len() + 1];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
    {
        if let Some(i) = VOCAB.iter().position(|w| *w == word) {
            v[i] += 1.0;
        }
    }
    v[VOCAB.len()] = 0.1;
    v
}

/// Embeds with [`keyword_vector`] and counts calls.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keyword_vector(text))
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

/// Always fails, like an embedding server that is down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
        Err(provider_error("embedding server unreachable"))
    }

    fn model(&self) -> &str {
        "failing-test"
    }
}

/// Fails for any text containing `FAIL`, embeds everything else.
pub struct FlakyEmbedder;

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if text.contains("FAIL") {
            Err(provider_error("model hiccup"))
        } else {
            Ok(keyword_vector(text))
        }
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

/// Returns an empty vector for any text containing `EMPTY`.
pub struct EmptyEmbedder;

#[async_trait]
impl Embedder for EmptyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if text.contains("EMPTY") {
            Ok(Vec::new())
        } else {
            Ok(keyword_vector(text))
        }
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

/// A different model: every text maps to the same short vector.
pub struct TinyEmbedder;

#[async_trait]
impl Embedder for TinyEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
        Ok(vec![0.5, 0.25, 1.0])
    }

    fn model(&self) -> &str {
        "tiny-test"
    }
}

fn provider_error(msg: &str) -> InferenceError {
    InferenceError::InvalidResponse(msg.to_string())
}

/// Streams fixed tokens, then finishes or fails.
pub struct ScriptedChat {
    pub tokens: Vec<String>,
    pub fail_after: bool,
    pub last_request: std::sync::Mutex<Option<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            fail_after: false,
            last_request: std::sync::Mutex::new(None),
        }
    }

    pub fn failing(tokens: &[&str]) -> Self {
        Self {
            fail_after: true,
            ..Self::new(tokens)
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        sink: &TokenSink,
    ) -> Result<StreamEnd, InferenceError> {
        *self.last_request.lock().unwrap() = Some(request.clone());
        for token in &self.tokens {
            if !sink.send_token(token.clone()).await {
                return Ok(StreamEnd::Cancelled);
            }
        }
        if self.fail_after {
            Err(InferenceError::Truncated)
        } else {
            Ok(StreamEnd::Completed)
        }
    }
}

/// Generates tokens until the consumer goes away, then records that it stopped.
#[derive(Default)]
pub struct EndlessChat {
    pub sent: AtomicUsize,
    pub stopped: Arc<AtomicBool>,
}

#[async_trait]
impl ChatModel for EndlessChat {
    async fn stream_chat(
        &self,
        _request: &ChatRequest,
        sink: &TokenSink,
    ) -> Result<StreamEnd, InferenceError> {
        loop {
            if !sink.send_token("la ").await {
                self.stopped.store(true, Ordering::SeqCst);
                return Ok(StreamEnd::Cancelled);
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Drain a chat stream to its end.
pub async fn collect_events(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Count rows in a table through a reader connection.
pub fn count_rows(engine: &Engine, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    engine
        .db()
        .with_reader(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
        .unwrap()
}
