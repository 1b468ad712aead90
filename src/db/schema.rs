//! SQL DDL for the journal retrieval tables.
//!
//! Defines `entries`, `chunks`, `chunk_fts` (FTS5, external content over
//! `chunks.text`), `chunk_vec` (packed float32 blobs), and `schema_meta`. The
//! v1 layout is the one existing journal databases already use, so such a file
//! can be opened in place. All DDL uses `IF NOT EXISTS`.

use rusqlite::Connection;

/// Base (v1) schema. Later additions live in [`super::migrations`].
const SCHEMA_SQL: &str = r#"
-- Journal entries (owned by the journal store; read during ingestion)
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    mood TEXT,
    tags TEXT
);

CREATE INDEX IF NOT EXISTS idx_entries_user_created ON entries(user_id, created_at);

-- Retrieval units
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY,
    entry_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    tags TEXT,
    FOREIGN KEY(entry_id) REFERENCES entries(id) ON DELETE CASCADE
);

-- Full-text search (BM25), rowid = chunks.id
CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
    text,
    content='chunks',
    content_rowid='id'
);

-- Dense embeddings: little-endian float32[dim], no padding
CREATE TABLE IF NOT EXISTS chunk_vec (
    id INTEGER PRIMARY KEY,
    dim INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    FOREIGN KEY(id) REFERENCES chunks(id) ON DELETE CASCADE
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in ["entries", "chunks", "chunk_fts", "chunk_vec", "schema_meta"] {
            assert!(
                tables.contains(&expected.to_string()),
                "missing table {expected}"
            );
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
