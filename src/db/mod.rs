pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Idle reader connections kept around for reuse.
const MAX_IDLE_READERS: usize = 4;

const BUSY_TIMEOUT_MS: u64 = 5000;

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Open (or create) the database at the given path with schema initialized and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets readers proceed while the single writer commits
    conn.pragma_update(None, "journal_mode", "WAL")?;
    configure(&conn)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// Shared handle to the store: one writer connection, plus reader connections
/// that run concurrently with it and with each other.
///
/// Cloning is cheap. All methods block; async callers go through
/// [`Database::read`] and [`Database::write`], which hop onto the blocking pool.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    uri: String,
    path: Option<PathBuf>,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Database {
    /// Open a file-backed database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = open_database(&path)?;
        Ok(Self::from_parts(
            path.to_string_lossy().into_owned(),
            Some(path),
            writer,
        ))
    }

    /// Open a private in-memory database. Reader connections share it through
    /// SQLite's shared cache for as long as the writer is alive.
    pub fn open_in_memory() -> Result<Self> {
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:journal-rag-{}-{seq}?mode=memory&cache=shared",
            std::process::id()
        );
        let mut writer = Connection::open_with_flags(&uri, uri_flags())
            .context("failed to open in-memory database")?;
        configure(&writer)?;
        schema::init_schema(&writer).context("failed to initialize schema")?;
        migrations::run_migrations(&mut writer).context("failed to run migrations")?;
        Ok(Self::from_parts(uri, None, writer))
    }

    fn from_parts(uri: String, path: Option<PathBuf>, writer: Connection) -> Self {
        Self {
            inner: Arc::new(Inner {
                uri,
                path,
                writer: Mutex::new(writer),
                readers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Run `f` on the writer connection. Writes are serialized here.
    pub fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let mut conn = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut conn)
    }

    /// Run `f` on a reader connection, opening one if none is idle.
    pub fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let idle = self
            .inner
            .readers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.open_reader()?,
        };

        let result = f(&conn);

        let mut readers = self
            .inner
            .readers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if readers.len() < MAX_IDLE_READERS {
            readers.push(conn);
        }
        result
    }

    fn open_reader(&self) -> crate::Result<Connection> {
        let flags = if self.inner.path.is_some() {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            uri_flags()
        };
        let conn = Connection::open_with_flags(&self.inner.uri, flags)?;
        configure(&conn)?;
        conn.pragma_update(None, "query_only", "ON")?;
        tracing::debug!("opened reader connection");
        Ok(conn)
    }

    /// [`Database::with_reader`] on the blocking pool.
    pub async fn read<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Connection) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_reader(f)).await?
    }

    /// [`Database::with_writer`] on the blocking pool.
    pub async fn write<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut Connection) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_writer(f)).await?
    }
}

fn uri_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub embedding_model: Option<String>,
    pub entry_count: u64,
    pub chunk_count: u64,
    pub embedding_count: u64,
}

/// Run `PRAGMA integrity_check` and collect schema metadata and row counts.
pub fn check_database_health(conn: &Connection) -> rusqlite::Result<HealthReport> {
    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let count = |table: &str| -> rusqlite::Result<u64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
    };

    Ok(HealthReport {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version: migrations::get_schema_version(conn)?,
        embedding_model: migrations::get_embedding_model(conn)?,
        entry_count: count("entries")?,
        chunk_count: count("chunks")?,
        embedding_count: count("chunk_vec")?,
    })
}
