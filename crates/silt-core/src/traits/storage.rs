//! Storage traits implemented by the SQLite engine.
//!
//! Hosts that want to stub out persistence (tests, dry runs) implement
//! these instead of linking the storage crate.

use crate::errors::StorageError;
use crate::types::{DedupOutcome, LogFilter, LogRecord, StoredLogRecord};

/// Buffered log writes and filtered reads.
pub trait ILogStore: Send + Sync {
    /// Append entries to the in-memory buffer. Never blocks on I/O and
    /// never fails; durability is deferred to the next flush.
    fn append_logs(&self, entries: Vec<LogRecord>);

    /// Drain the buffer and persist it as one batched write. Returns the
    /// number of rows handed to the insert statement.
    ///
    /// On a database error the drained batch is dropped, not re-enqueued:
    /// buffered logs are at-most-once, best-effort. A flush that times out
    /// waiting for schema readiness fails before draining and leaves the
    /// buffer intact.
    fn flush_logs(&self) -> Result<usize, StorageError>;

    /// Filtered read over persisted logs, newest first.
    fn query_logs(&self, filter: &LogFilter) -> Result<Vec<StoredLogRecord>, StorageError>;

    /// Total persisted log rows.
    fn count_logs(&self) -> Result<i64, StorageError>;
}

/// Notification-dedup recording.
pub trait INotificationStore: Send + Sync {
    /// Atomically read the prior occurrence for `fingerprint`, record a new
    /// one, and count same-UTC-day occurrences (including the new row).
    ///
    /// Under concurrent callers with the same fingerprint, two transactions
    /// may observe the same `previous` before either commits; callers must
    /// tolerate this race.
    fn record_notification(
        &self,
        correlation_id: i64,
        hostname: &str,
        fingerprint: &str,
    ) -> Result<DedupOutcome, StorageError>;
}

/// Retention sweeps and the TTL setting they honor.
pub trait IRetentionStore: Send + Sync {
    /// Delete expired log rows in bounded chunks. Errors are swallowed
    /// after logging; a sweep already in progress makes this a no-op.
    fn sweep_expired_logs(&self);

    /// Same contract as `sweep_expired_logs`, for the notifications table.
    fn sweep_expired_notifications(&self);

    /// Effective TTL in milliseconds (stored value, or the default).
    fn logs_ttl(&self) -> Result<i64, StorageError>;

    /// Persist a new TTL in milliseconds.
    fn set_logs_ttl(&self, ttl_ms: i64) -> Result<(), StorageError>;
}
