//! v001: logs, notifications, settings.

use rusqlite::Connection;

use silt_core::errors::{StorageError, StorageResult};

pub fn migrate(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS logs (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at     INTEGER NOT NULL,
            hostname       TEXT NOT NULL,
            pid            INTEGER NOT NULL,
            source         TEXT NOT NULL,
            level          TEXT NOT NULL DEFAULT 'info',
            message        TEXT NOT NULL,
            meta           TEXT,
            correlation_id INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_logs_created_at
            ON logs(created_at);
        -- Retried delivery of the same correlated entry must be a no-op
        -- under INSERT OR IGNORE.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_logs_correlation
            ON logs(correlation_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            correlation_id INTEGER NOT NULL,
            hostname       TEXT NOT NULL,
            fingerprint    TEXT NOT NULL CHECK (fingerprint <> ''),
            created_at     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_fingerprint
            ON notifications(fingerprint, created_at);

        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
    .map_err(StorageError::sqlite)
}
