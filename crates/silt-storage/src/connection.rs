//! `DatabaseManager` — write-serialized, read-pooled connection handling.
//!
//! One write connection behind a mutex, a small round-robin read pool, and
//! a factory for the batch writer's dedicated connection. File-backed
//! databases run in WAL mode; in-memory databases use a shared-cache URI so
//! the pool and the batch connection all see the same database.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use silt_core::config::StorageConfig;
use silt_core::errors::{StorageError, StorageResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Counter for unique shared-cache in-memory database names.
static MEM_DB_ID: AtomicU64 = AtomicU64::new(0);

/// Owns all connections to one database.
pub struct DatabaseManager {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    path: Option<PathBuf>,
    /// Shared-cache URI, set only for in-memory databases.
    mem_uri: Option<String>,
    wal: bool,
}

impl DatabaseManager {
    /// Open a file-backed database with a read pool sized per config.
    pub fn open(path: &Path, config: &StorageConfig) -> StorageResult<Self> {
        let writer = open_connection(&path.to_string_lossy(), true)?;
        let mut readers = Vec::with_capacity(config.read_pool_size);
        for _ in 0..config.read_pool_size {
            readers.push(Mutex::new(open_connection(&path.to_string_lossy(), true)?));
        }
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            path: Some(path.to_path_buf()),
            mem_uri: None,
            wal: true,
        })
    }

    /// Open an in-memory database (shared-cache, one per manager).
    pub fn open_in_memory(config: &StorageConfig) -> StorageResult<Self> {
        let id = MEM_DB_ID.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:silt-mem-{id}?mode=memory&cache=shared");
        let writer = open_connection(&uri, false)?;
        let mut readers = Vec::with_capacity(config.read_pool_size);
        for _ in 0..config.read_pool_size {
            readers.push(Mutex::new(open_connection(&uri, false)?));
        }
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            path: None,
            mem_uri: Some(uri),
            wal: false,
        })
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the single write connection. Callers holding the
    /// guard for the duration of a transaction get statement serialization
    /// for free.
    pub fn with_writer<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = lock_conn(&self.writer)?;
        f(&conn)
    }

    /// Run `f` against a read connection, picked round-robin.
    pub fn with_reader<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        if self.readers.is_empty() {
            return self.with_writer(f);
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = lock_conn(&self.readers[idx])?;
        f(&conn)
    }

    /// Open a fresh connection for the batch writer thread. The connection
    /// is moved into the thread and lives for its full lifetime.
    pub fn open_batch_connection(&self) -> StorageResult<Connection> {
        match (&self.path, &self.mem_uri) {
            (Some(path), _) => open_connection(&path.to_string_lossy(), true),
            (None, Some(uri)) => open_connection(uri, false),
            (None, None) => Err(StorageError::NotSupported {
                operation: "open_batch_connection".to_string(),
                reason: "manager has neither a path nor a memory URI".to_string(),
            }),
        }
    }

    /// Truncate the WAL. No-op for in-memory databases.
    pub fn checkpoint(&self) -> StorageResult<()> {
        if !self.wal {
            return Ok(());
        }
        self.with_writer(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                .map_err(StorageError::sqlite)
        })
    }
}

fn lock_conn(m: &Mutex<Connection>) -> StorageResult<MutexGuard<'_, Connection>> {
    m.lock()
        .map_err(|_| StorageError::sqlite("connection mutex poisoned"))
}

fn open_connection(target: &str, wal: bool) -> StorageResult<Connection> {
    let conn = Connection::open(target).map_err(StorageError::sqlite)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(StorageError::sqlite)?;
    if wal {
        // journal_mode returns the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(StorageError::sqlite)?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")
            .map_err(StorageError::sqlite)?;
    }
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(StorageError::sqlite)?;
    Ok(conn)
}
