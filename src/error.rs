//! Error taxonomy for the retrieval core.
//!
//! Storage and ranking functions return [`Result`]. Binary entry points and CLI
//! commands wrap these in `anyhow` with context, the way the rest of the crate
//! handles edge errors.

/// Errors raised by the chunk store, ingestion, and query orchestration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write referenced an owner row that does not exist (entry for a chunk,
    /// chunk for an embedding). Rejected, never retried.
    #[error("referential error: {0}")]
    Referential(String),

    /// A stored vector's byte length disagrees with its declared dimension.
    #[error("corrupt embedding for chunk {chunk_id}: {byte_len} bytes for dim {dim}")]
    Corruption {
        chunk_id: i64,
        dim: i64,
        byte_len: usize,
    },

    /// A stored vector has a different dimension than the query vector,
    /// usually because the embedding model changed without a re-embed.
    #[error("embedding dimension mismatch for chunk {chunk_id}: query has {expected}, stored has {actual}")]
    DimensionMismatch {
        chunk_id: i64,
        expected: usize,
        actual: usize,
    },

    /// An inference provider is not configured or failed outright.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A single provider call failed; the caller may skip and continue.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl Error {
    /// Map a rusqlite failure to [`Error::Referential`] when it is a foreign key
    /// violation, keeping every other failure as [`Error::Storage`].
    pub(crate) fn from_write(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Self::Referential(what.into())
            }
            other => Self::Storage(other),
        }
    }
}
