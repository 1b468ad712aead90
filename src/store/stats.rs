use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::Result;

/// Row counts and time range, for the whole store or one user.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub entries: u64,
    pub chunks: u64,
    pub embedded_chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<String>,
}

/// Compute store statistics, filtered to `user_id` when given.
pub fn store_stats(conn: &Connection, user_id: Option<&str>) -> Result<StoreStats> {
    let (entries, oldest_entry, newest_entry): (i64, Option<String>, Option<String>) = conn
        .query_row(
            "SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM entries \
             WHERE ?1 IS NULL OR user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

    let (chunks, embedded_chunks): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COUNT(v.id) FROM chunks c LEFT JOIN chunk_vec v ON v.id = c.id \
         WHERE ?1 IS NULL OR c.user_id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(StoreStats {
        entries: entries as u64,
        chunks: chunks as u64,
        embedded_chunks: embedded_chunks as u64,
        oldest_entry,
        newest_entry,
    })
}
