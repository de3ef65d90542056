//! settings table queries, plus the TTL read with its local fallback.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use silt_core::errors::{StorageError, StorageResult};

/// Settings key for the log/notification retention TTL, in milliseconds.
pub const LOGS_TTL_KEY: &str = "logsTTL";

pub fn get_setting(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
    conn.prepare_cached("SELECT value FROM settings WHERE key = ?1")
        .map_err(StorageError::sqlite)?
        .query_row(params![key], |row| row.get(0))
        .optional()
        .map_err(StorageError::sqlite)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.prepare_cached("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
        .map_err(StorageError::sqlite)?
        .execute(params![key, value])
        .map_err(StorageError::sqlite)?;
    Ok(())
}

/// Seed the TTL default on first startup. Existing values are left alone.
pub fn ensure_logs_ttl_default(conn: &Connection, default_ms: i64) -> StorageResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
        params![LOGS_TTL_KEY, default_ms.to_string()],
    )
    .map_err(StorageError::sqlite)?;
    Ok(())
}

/// Effective TTL in milliseconds. An absent or unparsable stored value
/// falls back to `default_ms`; that recovery is local and never surfaced.
pub fn logs_ttl(conn: &Connection, default_ms: i64) -> StorageResult<i64> {
    match get_setting(conn, LOGS_TTL_KEY)? {
        Some(raw) => match raw.parse::<i64>() {
            Ok(ttl) if ttl > 0 => Ok(ttl),
            _ => {
                warn!("unparsable {LOGS_TTL_KEY} value {raw:?}, using default {default_ms}");
                Ok(default_ms)
            }
        },
        None => Ok(default_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn ttl_falls_back_when_absent() {
        let conn = test_conn();
        assert_eq!(logs_ttl(&conn, 1_000).unwrap(), 1_000);
    }

    #[test]
    fn ttl_falls_back_when_unparsable() {
        let conn = test_conn();
        set_setting(&conn, LOGS_TTL_KEY, "three days").unwrap();
        assert_eq!(logs_ttl(&conn, 1_000).unwrap(), 1_000);

        set_setting(&conn, LOGS_TTL_KEY, "-5").unwrap();
        assert_eq!(logs_ttl(&conn, 1_000).unwrap(), 1_000);
    }

    #[test]
    fn seed_does_not_clobber_existing_value() {
        let conn = test_conn();
        set_setting(&conn, LOGS_TTL_KEY, "42").unwrap();
        ensure_logs_ttl_default(&conn, 1_000).unwrap();
        assert_eq!(logs_ttl(&conn, 1_000).unwrap(), 42);
    }
}
