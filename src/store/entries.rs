//! Entry store: the journal records chunks are derived from.
//!
//! Deleting an entry cascades through `chunks` to `chunk_vec`, and the
//! `chunks_fts_delete` trigger removes the matching lexical index rows.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{parse_tags, serialize_tags, Entry, NewEntry};
use crate::error::{Error, Result};

/// Insert a new entry and return its id.
pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<i64> {
    if entry.user_id.trim().is_empty() {
        return Err(Error::InvalidInput("user_id must not be empty".into()));
    }

    conn.execute(
        "INSERT INTO entries (user_id, title, body, created_at, mood, tags) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.user_id,
            entry.title,
            entry.body,
            entry.created_at,
            entry.mood,
            serialize_tags(&entry.tags),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch a single entry.
pub fn get_entry(conn: &Connection, entry_id: i64) -> Result<Option<Entry>> {
    let entry = conn
        .query_row(
            "SELECT id, user_id, title, body, created_at, mood, tags FROM entries WHERE id = ?1",
            params![entry_id],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// A user's entries, newest first.
pub fn list_entries(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, body, created_at, mood, tags FROM entries \
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![user_id, limit as i64], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Delete an entry with its chunks, lexical index rows, and embeddings.
/// Returns `false` if the entry did not exist.
pub fn delete_entry(conn: &mut Connection, entry_id: i64) -> Result<bool> {
    let tx = conn.transaction()?;
    let removed_chunks: i64 = tx.query_row(
        "SELECT COUNT(*) FROM chunks WHERE entry_id = ?1",
        params![entry_id],
        |row| row.get(0),
    )?;
    let rows = tx.execute("DELETE FROM entries WHERE id = ?1", params![entry_id])?;
    tx.commit()?;

    if rows > 0 {
        tracing::info!(entry_id, removed_chunks, "entry deleted");
    }
    Ok(rows > 0)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let tags: Option<String> = row.get(6)?;
    Ok(Entry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        body: row.get(3)?,
        created_at: row.get(4)?,
        mood: row.get::<_, Option<String>>(5)?.filter(|m| !m.is_empty()),
        tags: parse_tags(tags.as_deref()),
    })
}
