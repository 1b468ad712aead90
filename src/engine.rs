//! The query engine: one context object holding the store, the optional
//! inference providers, and configuration.
//!
//! Built once at startup and cloned into request handlers. Every operation the
//! HTTP service and the CLI expose goes through here.
//!
//! # Retrieval
//!
//! Lexical search always runs first. If an embedder is configured and the
//! lexical pass found something, a dense pass runs too and the two rankings are
//! fused and recency-boosted. Anything going wrong in the dense pass drops back
//! to the lexical hits; only a failure of lexical search itself is an error.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::db::{self, Database, HealthReport};
use crate::error::{Error, Result};
use crate::inference::{self, ChatModel, ChatRequest, Embedder, StreamEnd};
use crate::ingest::{write_entry, WrittenChunk};
use crate::retrieval::{
    build_prompt, dense_search, recency_boost, reciprocal_rank_fusion,
};
use crate::store::chunks::{
    all_chunks, chunks_missing_embeddings, get_embeddings_for_user, lexical_search, next_position,
    put_chunk, put_embedding,
};
use crate::store::entries;
use crate::store::stats::{store_stats, StoreStats};
use crate::store::types::{serialize_tags, Entry, NewEntry, RankedDoc};
use crate::stream::{ChatEvent, SourceRef, TokenSink, EVENT_BUFFER};

/// Streamed instead of an answer when no chat model is configured.
pub const CHAT_UNAVAILABLE_MESSAGE: &str =
    "The chat model is not available right now. Your journal context was retrieved, \
     but no answer can be generated until a chat model is configured.";

/// Which retrieval path produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Dense and lexical rankings fused, then recency-boosted.
    Hybrid,
    /// Lexical hits only, because no embedder is configured or nothing matched.
    Lexical,
    /// Lexical hits only, because the dense pass failed.
    Fallback,
}

/// Ranked context for one query.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub mode: RetrievalMode,
    pub docs: Vec<RankedDoc>,
}

/// What the dense-and-fuse step produced.
enum DenseOutcome {
    Fused(Vec<RankedDoc>),
    /// The embedder could not serve the query.
    Degraded(String),
    /// Reading, decoding, or scoring stored vectors failed.
    Failed(Error),
}

/// Result of [`Engine::ingest_entry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub entry_id: i64,
    pub chunks: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// A one-off chunk appended to an existing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChunk {
    pub user_id: String,
    pub entry_id: i64,
    pub text: String,
    pub created_at: String,
    #[serde(default, deserialize_with = "crate::store::types::deserialize_tags")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub date: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub mode: RetrievalMode,
    pub results: Vec<SearchHit>,
}

/// Result of [`Engine::backfill_embeddings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Engine {
    db: Database,
    embedder: Option<Arc<dyn Embedder>>,
    chat: Option<Arc<dyn ChatModel>>,
    config: Arc<Config>,
}

impl Engine {
    pub fn new(
        db: Database,
        embedder: Option<Arc<dyn Embedder>>,
        chat: Option<Arc<dyn ChatModel>>,
        config: Config,
    ) -> Self {
        Self {
            db,
            embedder,
            chat,
            config: Arc::new(config),
        }
    }

    /// Open the configured database and build the configured providers.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let db_path = config.resolved_db_path();
        let db = Database::open(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let embedder = inference::create_embedder(&config.embedding)?;
        let chat = inference::create_chat_model(&config.chat)?;
        if embedder.is_none() {
            tracing::warn!("no embedding provider configured, search is lexical-only");
        }
        if chat.is_none() {
            tracing::warn!("no chat provider configured, chat will answer with a placeholder");
        }

        let engine = Self::new(db, embedder, chat, config);
        engine.warn_on_model_mismatch()?;
        Ok(engine)
    }

    fn warn_on_model_mismatch(&self) -> anyhow::Result<()> {
        let Some(embedder) = &self.embedder else {
            return Ok(());
        };
        let stored = self
            .db
            .with_reader(|conn| Ok(db::migrations::get_embedding_model(conn)?))?;
        if let Some(stored) = stored {
            if stored != embedder.model() {
                tracing::warn!(
                    stored = %stored,
                    configured = %embedder.model(),
                    "embedding model changed, run `journal-rag reembed` to update all vectors"
                );
            }
        }
        Ok(())
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn has_chat(&self) -> bool {
        self.chat.is_some()
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Store an entry, chunk it, and embed each chunk.
    ///
    /// The entry and its chunks are committed before any embedding call, so a
    /// provider outage never loses text. Failed embeddings are logged and
    /// counted; `reembed` can fill them in later.
    pub async fn ingest_entry(&self, entry: NewEntry) -> Result<IngestReport> {
        if entry.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id must not be empty".into()));
        }
        let params = self.config.retrieval.chunking();
        let (entry_id, written) = self
            .db
            .write(move |conn| write_entry(conn, &entry, params))
            .await?;

        let chunks = written.len();
        let (embedded, failed) = self.embed_chunks(written, &mut |_, _| {}).await?;

        tracing::info!(entry_id, chunks, embedded, failed, "entry ingested");
        Ok(IngestReport {
            entry_id,
            chunks,
            embedded,
            failed,
        })
    }

    /// Append one chunk to an existing entry and embed it if possible.
    pub async fn add_chunk(&self, chunk: NewChunk) -> Result<i64> {
        if chunk.text.trim().is_empty() {
            return Err(Error::InvalidInput("chunk text must not be empty".into()));
        }
        let text = chunk.text.clone();
        let chunk_id = self
            .db
            .write(move |conn| {
                let tx = conn.transaction()?;
                let position = next_position(&tx, chunk.entry_id)?;
                let id = put_chunk(
                    &tx,
                    chunk.entry_id,
                    &chunk.user_id,
                    position,
                    &chunk.text,
                    &chunk.created_at,
                    serialize_tags(&chunk.tags).as_deref(),
                )?;
                tx.commit()?;
                Ok(id)
            })
            .await?;

        let (embedded, _) = self
            .embed_chunks(
                vec![WrittenChunk {
                    id: chunk_id,
                    position: 0,
                    text,
                }],
                &mut |_, _| {},
            )
            .await?;
        tracing::info!(chunk_id, embedded = embedded > 0, "chunk added");
        Ok(chunk_id)
    }

    /// Embed chunks one at a time and store each vector. Returns
    /// `(embedded, failed)`; with no embedder every chunk is left for later.
    ///
    /// `progress` is called with `(done, total)` before each chunk.
    async fn embed_chunks(
        &self,
        chunks: Vec<WrittenChunk>,
        progress: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<(usize, usize)> {
        let Some(embedder) = self.embedder.clone() else {
            return Ok((0, 0));
        };

        let total = chunks.len();
        let mut embedded = 0;
        let mut failed = 0;
        for (done, chunk) in chunks.into_iter().enumerate() {
            progress(done, total);
            let vector = match embedder.embed(&chunk.text).await {
                Ok(vector) => vector,
                Err(e) => {
                    let err = Error::Transient(e.to_string());
                    tracing::error!(chunk_id = chunk.id, error = %err, "failed to embed chunk");
                    failed += 1;
                    continue;
                }
            };

            let model = embedder.model().to_string();
            let stored = self
                .db
                .write(move |conn| {
                    put_embedding(conn, chunk.id, &vector)?;
                    db::migrations::set_embedding_model(conn, &model)?;
                    Ok(())
                })
                .await;
            match stored {
                Ok(()) => embedded += 1,
                // The chunk may have been deleted while we were embedding it
                Err(Error::Referential(msg)) => {
                    tracing::warn!(chunk_id = chunk.id, %msg, "chunk vanished before its embedding was stored");
                    failed += 1;
                }
                // A vector the store refuses (empty, for one) only costs this chunk
                Err(err @ Error::InvalidInput(_)) => {
                    tracing::error!(chunk_id = chunk.id, error = %err, "embedding rejected by the store");
                    failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((embedded, failed))
    }

    /// Embed every chunk that has no vector yet, optionally for one user.
    pub async fn backfill_embeddings(&self, user_id: Option<String>) -> Result<BackfillReport> {
        self.embed_stored(user_id, false, &mut |_, _| {}).await
    }

    /// Re-embed every chunk with the configured model, replacing stored
    /// vectors in place. Used after the embedding model changes.
    pub async fn reembed_all(&self, user_id: Option<String>) -> Result<BackfillReport> {
        self.embed_stored(user_id, true, &mut |_, _| {}).await
    }

    /// Embed stored chunks: all of them when `all` is set, otherwise only
    /// those without a vector. `progress` sees `(done, total)`.
    pub async fn embed_stored(
        &self,
        user_id: Option<String>,
        all: bool,
        progress: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<BackfillReport> {
        if self.embedder.is_none() {
            return Err(Error::ProviderUnavailable(
                "no embedding provider configured".into(),
            ));
        }
        let missing = self
            .db
            .read(move |conn| {
                if all {
                    all_chunks(conn, user_id.as_deref())
                } else {
                    chunks_missing_embeddings(conn, user_id.as_deref())
                }
            })
            .await?;
        let pending = missing.len();
        tracing::info!(pending, all, "embedding stored chunks");

        let written = missing
            .into_iter()
            .map(|c| WrittenChunk {
                id: c.id,
                position: c.position,
                text: c.text,
            })
            .collect();
        let (embedded, failed) = self.embed_chunks(written, progress).await?;
        progress(pending, pending);

        tracing::info!(pending, embedded, failed, "embedding pass complete");
        Ok(BackfillReport {
            pending,
            embedded,
            failed,
        })
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    /// Rank a user's chunks against `query`, returning at most `k` docs.
    pub async fn retrieve(&self, user_id: &str, query: &str, k: usize) -> Result<Retrieval> {
        let candidates = self.config.retrieval.candidate_floor.max(k);
        let sparse: Vec<RankedDoc> = {
            let user_id = user_id.to_string();
            let query = query.to_string();
            self.db
                .read(move |conn| lexical_search(conn, &user_id, &query, candidates))
                .await?
                .into_iter()
                .map(|chunk| RankedDoc::from_chunk(chunk, 1.0))
                .collect()
        };

        if self.embedder.is_none() || sparse.is_empty() {
            tracing::debug!(user_id, hits = sparse.len(), "lexical-only retrieval");
            return Ok(Retrieval {
                mode: RetrievalMode::Lexical,
                docs: take_lexical(sparse, k),
            });
        }

        match self.dense_and_fuse(user_id, query, &sparse, k).await {
            DenseOutcome::Fused(docs) => {
                tracing::debug!(user_id, results = docs.len(), "hybrid retrieval");
                Ok(Retrieval {
                    mode: RetrievalMode::Hybrid,
                    docs,
                })
            }
            DenseOutcome::Degraded(reason) => {
                tracing::warn!(user_id, %reason, "dense search unavailable, using lexical results");
                Ok(Retrieval {
                    mode: RetrievalMode::Fallback,
                    docs: take_lexical(sparse, k),
                })
            }
            DenseOutcome::Failed(err) => {
                tracing::error!(user_id, error = %err, "dense search failed, using lexical results");
                Ok(Retrieval {
                    mode: RetrievalMode::Fallback,
                    docs: take_lexical(sparse, k),
                })
            }
        }
    }

    async fn dense_and_fuse(
        &self,
        user_id: &str,
        query: &str,
        sparse: &[RankedDoc],
        k: usize,
    ) -> DenseOutcome {
        let Some(embedder) = &self.embedder else {
            return DenseOutcome::Degraded("no embedding provider configured".into());
        };
        let query_vec = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => return DenseOutcome::Degraded(e.to_string()),
        };

        let owner = user_id.to_string();
        let corpus = match self
            .db
            .read(move |conn| get_embeddings_for_user(conn, &owner))
            .await
        {
            Ok(corpus) => corpus,
            Err(e) => return DenseOutcome::Failed(e),
        };

        let retrieval = &self.config.retrieval;
        let candidates = retrieval.candidate_floor.max(k);
        let dense = match dense_search(&query_vec, &corpus, candidates) {
            Ok(dense) => dense,
            Err(e) => return DenseOutcome::Failed(e),
        };
        let fused = reciprocal_rank_fusion(&dense, sparse, retrieval.rrf_k, k);
        DenseOutcome::Fused(recency_boost(fused, Utc::now(), &retrieval.recency()))
    }

    /// Ranked search results with text cut to the configured preview length.
    pub async fn search(&self, user_id: &str, query: &str, k: Option<usize>) -> Result<SearchResponse> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        let retrieval = self.retrieve(user_id, query, k).await?;
        let preview = self.config.retrieval.search_preview_chars;
        let results = retrieval
            .docs
            .into_iter()
            .map(|doc| SearchHit {
                id: doc.id,
                text: truncate_chars(&doc.text, preview),
                date: doc.date,
                score: doc.score,
            })
            .collect();
        Ok(SearchResponse {
            mode: retrieval.mode,
            results,
        })
    }

    // ── Chat ─────────────────────────────────────────────────────────────────

    /// Retrieve context for `question` and stream an answer.
    ///
    /// Retrieval happens before this returns, so a storage failure is an `Err`
    /// rather than an event. The receiver then yields one
    /// [`ChatEvent::Sources`], tokens, and a terminal event. Dropping it stops
    /// generation.
    pub async fn chat(
        &self,
        user_id: &str,
        question: &str,
        k: Option<usize>,
    ) -> Result<mpsc::Receiver<ChatEvent>> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        let retrieval = self.retrieve(user_id, question, k).await?;

        let preview = self.config.retrieval.source_preview_chars;
        let sources: Vec<SourceRef> = retrieval
            .docs
            .iter()
            .map(|doc| SourceRef {
                id: doc.id,
                date: doc.date.clone(),
                preview: truncate_chars(&doc.text, preview),
            })
            .collect();
        let prompt = build_prompt(question, &retrieval.docs);
        let request = ChatRequest {
            system: prompt.system,
            user: prompt.user,
            max_tokens: self.config.chat.max_tokens,
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let sink = TokenSink::new(tx);
        let chat = self.chat.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            if !sink.send(ChatEvent::Sources(sources)).await {
                return;
            }

            let Some(chat) = chat else {
                if sink.send_token(CHAT_UNAVAILABLE_MESSAGE).await {
                    sink.send(ChatEvent::Done).await;
                }
                return;
            };

            match chat.stream_chat(&request, &sink).await {
                Ok(StreamEnd::Completed) => {
                    sink.send(ChatEvent::Done).await;
                }
                Ok(StreamEnd::Cancelled) => {
                    tracing::info!(user_id = %user_id, "chat stream cancelled by client");
                }
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "chat stream failed");
                    sink.send(ChatEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                }
            }
        });

        Ok(rx)
    }

    // ── Entries & stats ──────────────────────────────────────────────────────

    pub async fn get_entry(&self, entry_id: i64) -> Result<Entry> {
        self.db
            .read(move |conn| entries::get_entry(conn, entry_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("entry {entry_id}")))
    }

    pub async fn list_entries(&self, user_id: &str, limit: usize) -> Result<Vec<Entry>> {
        let user_id = user_id.to_string();
        self.db
            .read(move |conn| entries::list_entries(conn, &user_id, limit))
            .await
    }

    /// Delete an entry and everything derived from it.
    pub async fn delete_entry(&self, entry_id: i64) -> Result<()> {
        let removed = self
            .db
            .write(move |conn| entries::delete_entry(conn, entry_id))
            .await?;
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(format!("entry {entry_id}")))
        }
    }

    pub async fn stats(&self, user_id: Option<String>) -> Result<StoreStats> {
        self.db
            .read(move |conn| store_stats(conn, user_id.as_deref()))
            .await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        self.db
            .read(|conn| Ok(db::check_database_health(conn)?))
            .await
    }
}

/// The lexical fallback: first `k` hits, unscored.
fn take_lexical(sparse: Vec<RankedDoc>, k: usize) -> Vec<RankedDoc> {
    sparse
        .into_iter()
        .take(k)
        .map(|doc| RankedDoc { score: 1.0, ..doc })
        .collect()
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
