//! `SiltStorageEngine` — unified owner of the database, the buffered log
//! writer, and the retention sweeper.
//!
//! All reads go through `with_reader()`, all foreground writes through
//! `with_writer()`; the flusher thread holds its own connection. No code
//! outside this crate should touch a raw `&Connection`.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use silt_core::config::StorageConfig;
use silt_core::errors::{StorageError, StorageResult};
use silt_core::traits::storage::{ILogStore, INotificationStore, IRetentionStore};
use silt_core::types::{DedupOutcome, LogFilter, LogRecord, StoredLogRecord};

use crate::batch::LogBuffer;
use crate::connection::DatabaseManager;
use crate::gate::SchemaGate;
use crate::queries;
use crate::retention::RetentionSweeper;
use crate::schema;

/// The unified storage engine.
///
/// Construction order matters: the flusher thread starts before migrations
/// run, so any flush that races initialization parks on the schema gate
/// instead of hitting missing tables.
pub struct SiltStorageEngine {
    db: Arc<DatabaseManager>,
    gate: Arc<SchemaGate>,
    buffer: LogBuffer,
    sweeper: RetentionSweeper,
    config: StorageConfig,
}

impl SiltStorageEngine {
    /// Open a file-backed engine at the given path with default config.
    /// Runs migrations, seeds the TTL default, and opens the gate.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_config(path, StorageConfig::default())
    }

    pub fn open_with_config(path: &Path, config: StorageConfig) -> StorageResult<Self> {
        let db = Arc::new(DatabaseManager::open(path, &config)?);
        Self::build(db, config)
    }

    /// Open an in-memory engine (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open_in_memory_with_config(StorageConfig::default())
    }

    pub fn open_in_memory_with_config(config: StorageConfig) -> StorageResult<Self> {
        let db = Arc::new(DatabaseManager::open_in_memory(&config)?);
        Self::build(db, config)
    }

    fn build(db: Arc<DatabaseManager>, config: StorageConfig) -> StorageResult<Self> {
        let gate = Arc::new(SchemaGate::new());

        let batch_conn = db.open_batch_connection()?;
        let buffer = LogBuffer::new(batch_conn, Arc::clone(&gate), &config);

        db.with_writer(|conn| {
            schema::run_migrations(conn)?;
            queries::settings::ensure_logs_ttl_default(conn, config.logs_ttl_default_ms)
        })?;
        gate.mark_ready();

        let sweeper = RetentionSweeper::new(Arc::clone(&db), &config);

        Ok(Self {
            db,
            gate,
            buffer,
            sweeper,
            config,
        })
    }

    /// Whether schema setup has completed.
    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.db.path()
    }

    /// WAL checkpoint delegation.
    pub fn checkpoint(&self) -> StorageResult<()> {
        self.db.checkpoint()
    }

    /// Entries currently buffered and awaiting flush.
    pub fn pending_logs(&self) -> usize {
        self.buffer.pending_len()
    }

    /// Flush the tail of the buffer and stop the flusher thread.
    pub fn shutdown(self) -> StorageResult<()> {
        self.buffer.shutdown()
    }

    /// Raw read access. Prefer the trait methods where possible.
    pub fn with_reader<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StorageResult<T>,
    {
        self.db.with_reader(f)
    }

    /// Raw write access. Prefer the trait methods where possible.
    pub fn with_writer<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StorageResult<T>,
    {
        self.db.with_writer(f)
    }
}

impl ILogStore for SiltStorageEngine {
    fn append_logs(&self, entries: Vec<LogRecord>) {
        self.buffer.append(entries);
    }

    fn flush_logs(&self) -> Result<usize, StorageError> {
        self.buffer.flush_sync()
    }

    fn query_logs(&self, filter: &LogFilter) -> Result<Vec<StoredLogRecord>, StorageError> {
        self.db.with_reader(|conn| queries::logs::query_logs(conn, filter))
    }

    fn count_logs(&self) -> Result<i64, StorageError> {
        self.db.with_reader(queries::logs::count_logs)
    }
}

impl INotificationStore for SiltStorageEngine {
    /// Read-prior, insert, count-today in one transaction.
    ///
    /// The read and the insert are not a compare-and-swap: two concurrent
    /// callers with the same fingerprint may both observe the same
    /// `previous` before either commits. Known limitation, left as-is.
    fn record_notification(
        &self,
        correlation_id: i64,
        hostname: &str,
        fingerprint: &str,
    ) -> Result<DedupOutcome, StorageError> {
        self.db.with_writer(|conn| {
            let tx = conn.unchecked_transaction().map_err(StorageError::sqlite)?;

            let previous = queries::notifications::latest_for_fingerprint(&tx, fingerprint)?;

            let now = Utc::now();
            queries::notifications::insert_notification(
                &tx,
                correlation_id,
                hostname,
                fingerprint,
                now.timestamp_millis(),
            )?;

            let (day_start, day_end) = queries::notifications::utc_day_bounds(now);
            let today_count = queries::notifications::count_for_fingerprint_between(
                &tx, fingerprint, day_start, day_end,
            )?;

            // Any error above drops `tx`, rolling the whole unit back.
            tx.commit().map_err(StorageError::sqlite)?;
            Ok(DedupOutcome {
                previous,
                today_count,
            })
        })
    }
}

impl IRetentionStore for SiltStorageEngine {
    fn sweep_expired_logs(&self) {
        self.sweeper.sweep_expired_logs();
    }

    fn sweep_expired_notifications(&self) {
        self.sweeper.sweep_expired_notifications();
    }

    fn logs_ttl(&self) -> Result<i64, StorageError> {
        let default_ms = self.config.logs_ttl_default_ms;
        self.db
            .with_reader(|conn| queries::settings::logs_ttl(conn, default_ms))
    }

    fn set_logs_ttl(&self, ttl_ms: i64) -> Result<(), StorageError> {
        self.db.with_writer(|conn| {
            queries::settings::set_setting(
                conn,
                queries::settings::LOGS_TTL_KEY,
                &ttl_ms.to_string(),
            )
        })
    }
}
