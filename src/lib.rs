//! Hybrid retrieval over a personal journal, feeding a streaming chat model.
//!
//! Entries are split into overlapping chunks and stored in SQLite. A question
//! is answered from the chunks that both an FTS5/BM25 keyword search and a
//! cosine-similarity vector search rank highly, fused with Reciprocal Rank
//! Fusion and nudged toward recent entries. The result becomes the context of
//! a chat prompt whose answer streams back token by token.
//!
//! Embeddings and chat are optional: without an embedder retrieval is
//! keyword-only, and without a chat model the stream carries a placeholder.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite connections, schema, migrations, and health checks
//! - [`store`]: Entries, chunks, embeddings, and keyword search
//! - [`ingest`]: Chunking and atomic entry writes
//! - [`retrieval`]: Dense scoring, rank fusion, recency, and prompt assembly
//! - [`inference`]: Embedding and chat providers
//! - [`stream`]: Chat event types and the bounded token sink
//! - [`engine`]: The context object tying the above together

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod stream;

pub use engine::Engine;
pub use error::{Error, Result};
