//! Chunk writes, embedding upserts, the per-user vector scan, and BM25 search.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{Chunk, StoredEmbedding};
use super::{pack_embedding, unpack_embedding};
use crate::error::{Error, Result};

const CHUNK_COLUMNS: &str =
    "c.id, c.entry_id, c.user_id, c.chunk_index, c.text, c.created_at, c.tags";

/// Append a chunk and index its text for lexical search.
///
/// Fails with [`Error::Referential`] if `entry_id` does not exist. Callers that
/// write several chunks should do so inside one transaction.
pub fn put_chunk(
    conn: &Connection,
    entry_id: i64,
    user_id: &str,
    position: i64,
    text: &str,
    created_at: &str,
    tags: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO chunks (entry_id, user_id, chunk_index, text, created_at, tags) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![entry_id, user_id, position, text, created_at, tags],
    )
    .map_err(|e| Error::from_write(e, format!("entry {entry_id} does not exist")))?;
    let chunk_id = conn.last_insert_rowid();

    // Must use the same rowid as the chunks row
    conn.execute(
        "INSERT INTO chunk_fts (rowid, text) VALUES (?1, ?2)",
        params![chunk_id, text],
    )?;

    Ok(chunk_id)
}

/// Store (or replace) the embedding for a chunk. Re-embedding overwrites.
pub fn put_embedding(conn: &Connection, chunk_id: i64, vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::InvalidInput(format!(
            "empty embedding for chunk {chunk_id}"
        )));
    }

    conn.execute(
        "INSERT INTO chunk_vec (id, dim, embedding) VALUES (?1, ?2, ?3) \
         ON CONFLICT(id) DO UPDATE SET dim = excluded.dim, embedding = excluded.embedding",
        params![chunk_id, vector.len() as i64, pack_embedding(vector)],
    )
    .map_err(|e| Error::from_write(e, format!("chunk {chunk_id} does not exist")))?;
    Ok(())
}

/// Read back one chunk's embedding.
pub fn get_embedding(conn: &Connection, chunk_id: i64) -> Result<Option<Vec<f32>>> {
    let row: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT dim, embedding FROM chunk_vec WHERE id = ?1",
            params![chunk_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(dim, blob)| unpack_embedding(chunk_id, dim, &blob))
        .transpose()
}

/// Every embedded chunk of one user, in chunk id order.
///
/// No pagination: one user's journal is expected to fit in memory for a
/// scoring pass.
pub fn get_embeddings_for_user(conn: &Connection, user_id: &str) -> Result<Vec<StoredEmbedding>> {
    let mut stmt = conn.prepare(
        "SELECT v.id, v.dim, v.embedding, c.created_at, c.text \
         FROM chunk_vec v JOIN chunks c ON c.id = v.id \
         WHERE c.user_id = ?1 ORDER BY v.id",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(chunk_id, dim, blob, date, text)| {
            Ok(StoredEmbedding {
                chunk_id,
                vector: unpack_embedding(chunk_id, dim, &blob)?,
                date,
                text,
            })
        })
        .collect()
}

/// BM25-ranked keyword search over one user's chunks.
///
/// Returns at most `limit` chunks, most relevant first. A query with no
/// searchable terms returns nothing rather than an FTS syntax error.
pub fn lexical_search(
    conn: &Connection,
    user_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<Chunk>> {
    let match_query = build_match_query(query);
    if match_query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunk_fts \
         JOIN chunks c ON c.id = chunk_fts.rowid \
         WHERE chunk_fts MATCH ?1 AND c.user_id = ?2 \
         ORDER BY bm25(chunk_fts), c.id LIMIT ?3"
    ))?;
    let hits = stmt
        .query_map(params![match_query, user_id, limit as i64], chunk_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(user_id, query = %match_query, hits = hits.len(), "lexical search");
    Ok(hits)
}

/// All chunks of an entry by position.
pub fn chunks_for_entry(conn: &Connection, entry_id: i64) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.entry_id = ?1 ORDER BY c.chunk_index, c.id"
    ))?;
    let chunks = stmt
        .query_map(params![entry_id], chunk_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chunks)
}

/// Chunks with no stored embedding, optionally limited to one user.
pub fn chunks_missing_embeddings(conn: &Connection, user_id: Option<&str>) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks c LEFT JOIN chunk_vec v ON v.id = c.id \
         WHERE v.id IS NULL AND (?1 IS NULL OR c.user_id = ?1) ORDER BY c.id"
    ))?;
    let chunks = stmt
        .query_map(params![user_id], chunk_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chunks)
}

/// Every chunk, optionally limited to one user, in id order.
pub fn all_chunks(conn: &Connection, user_id: Option<&str>) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE ?1 IS NULL OR c.user_id = ?1 ORDER BY c.id"
    ))?;
    let chunks = stmt
        .query_map(params![user_id], chunk_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chunks)
}

/// Position to use for a chunk appended after an entry's existing ones.
pub fn next_position(conn: &Connection, entry_id: i64) -> Result<i64> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM chunks WHERE entry_id = ?1",
        params![entry_id],
        |row| row.get(0),
    )?;
    Ok(next)
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        user_id: row.get(2)?,
        position: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
        tags: row.get(6)?,
    })
}

/// Turn free text into an FTS5 MATCH expression.
///
/// Splits on anything that is not alphanumeric, quotes each distinct term so
/// FTS5 operators in user input are inert, and ORs them together so a
/// natural-language question still matches chunks sharing any of its words.
/// BM25 ranks chunks matching more terms higher.
pub fn build_match_query(query: &str) -> String {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let term = term.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
