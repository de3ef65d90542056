//! v002: covering index for the notification sweep cutoff scan.

use rusqlite::Connection;

use silt_core::errors::{StorageError, StorageResult};

pub fn migrate(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_notifications_created_at
            ON notifications(created_at);
        ",
    )
    .map_err(StorageError::sqlite)
}
