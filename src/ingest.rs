//! Ingestion: split an entry body into overlapping windows and write them.
//!
//! [`chunk_text`] is pure. [`write_entry`] stores an entry and its chunks in one
//! transaction; embedding the chunks afterwards is the engine's job, since it
//! needs the (async, optional) embedding provider.

use rusqlite::Connection;

use crate::error::Result;
use crate::store::chunks::put_chunk;
use crate::store::entries::insert_entry;
use crate::store::types::{serialize_tags, NewEntry};

/// Window size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub target_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            target_size: 2400,
            overlap: 200,
        }
    }
}

/// A chunk written during ingestion, not yet embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenChunk {
    pub id: i64,
    pub position: i64,
    pub text: String,
}

/// Split `body` into windows of at most `target_size` characters.
///
/// Whitespace runs collapse to one space and the ends are trimmed first. Each
/// window starts `target_size - overlap` characters after the previous one; the
/// last window ends at the end of the text. Empty input gives no chunks.
///
/// `target_size` is raised to at least 1 and `overlap` capped below it, so the
/// walk always advances.
pub fn chunk_text(body: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }

    let target_size = target_size.max(1);
    let overlap = overlap.min(target_size - 1);
    let chars: Vec<char> = normalized.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + target_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// Insert `entry` and its chunks atomically. Returns the entry id and the
/// written chunks in position order.
pub fn write_entry(
    conn: &mut Connection,
    entry: &NewEntry,
    params: ChunkingParams,
) -> Result<(i64, Vec<WrittenChunk>)> {
    let tx = conn.transaction()?;
    let entry_id = insert_entry(&tx, entry)?;
    let tags = serialize_tags(&entry.tags);

    let mut written = Vec::new();
    for (position, text) in chunk_text(&entry.body, params.target_size, params.overlap)
        .into_iter()
        .enumerate()
    {
        let position = position as i64;
        let id = put_chunk(
            &tx,
            entry_id,
            &entry.user_id,
            position,
            &text,
            &entry.created_at,
            tags.as_deref(),
        )?;
        written.push(WrittenChunk { id, position, text });
    }
    tx.commit()?;

    tracing::debug!(entry_id, chunks = written.len(), "entry chunked");
    Ok((entry_id, written))
}
