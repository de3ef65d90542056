//! notifications table queries.

use chrono::{DateTime, Days, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use silt_core::errors::{StorageError, StorageResult};
use silt_core::types::NotificationRecord;

/// The most recent occurrence for a fingerprint, if any.
pub fn latest_for_fingerprint(
    conn: &Connection,
    fingerprint: &str,
) -> StorageResult<Option<NotificationRecord>> {
    conn.prepare_cached(
        "SELECT id, correlation_id, hostname, fingerprint, created_at
         FROM notifications WHERE fingerprint = ?1
         ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .map_err(StorageError::sqlite)?
    .query_row(params![fingerprint], map_notification_row)
    .optional()
    .map_err(StorageError::sqlite)
}

/// Insert a new occurrence. Returns the assigned row id.
pub fn insert_notification(
    conn: &Connection,
    correlation_id: i64,
    hostname: &str,
    fingerprint: &str,
    created_at: i64,
) -> StorageResult<i64> {
    conn.prepare_cached(
        "INSERT INTO notifications (correlation_id, hostname, fingerprint, created_at)
         VALUES (?1, ?2, ?3, ?4)",
    )
    .map_err(StorageError::sqlite)?
    .execute(params![correlation_id, hostname, fingerprint, created_at])
    .map_err(StorageError::sqlite)?;
    Ok(conn.last_insert_rowid())
}

/// Count occurrences for a fingerprint in `[start, end)`.
pub fn count_for_fingerprint_between(
    conn: &Connection,
    fingerprint: &str,
    start: i64,
    end: i64,
) -> StorageResult<i64> {
    conn.prepare_cached(
        "SELECT COUNT(*) FROM notifications
         WHERE fingerprint = ?1 AND created_at >= ?2 AND created_at < ?3",
    )
    .map_err(StorageError::sqlite)?
    .query_row(params![fingerprint, start, end], |row| row.get(0))
    .map_err(StorageError::sqlite)
}

/// Count all occurrences for a fingerprint.
pub fn count_for_fingerprint(conn: &Connection, fingerprint: &str) -> StorageResult<i64> {
    conn.prepare_cached("SELECT COUNT(*) FROM notifications WHERE fingerprint = ?1")
        .map_err(StorageError::sqlite)?
        .query_row(params![fingerprint], |row| row.get(0))
        .map_err(StorageError::sqlite)
}

/// Delete up to `limit` rows older than `cutoff`, oldest ids first, via
/// select-then-delete-by-id-list. Returns the number of rows deleted.
pub fn delete_expired_chunk(
    conn: &Connection,
    cutoff: i64,
    limit: usize,
) -> StorageResult<usize> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id FROM notifications WHERE created_at < ?1 ORDER BY id LIMIT ?2",
        )
        .map_err(StorageError::sqlite)?;
    let ids = stmt
        .query_map(params![cutoff, limit as i64], |row| row.get::<_, i64>(0))
        .map_err(StorageError::sqlite)?
        .collect::<Result<Vec<i64>, _>>()
        .map_err(StorageError::sqlite)?;

    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM notifications WHERE id IN ({placeholders})");
    let refs: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
    conn.execute(&sql, &refs[..]).map_err(StorageError::sqlite)
}

/// Millisecond bounds of the UTC calendar day containing `now`:
/// inclusive start, exclusive next-day start.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (i64, i64) {
    let day = now.date_naive();
    let start = day.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    let end = (day + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp_millis();
    (start, end)
}

fn map_notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        correlation_id: row.get(1)?,
        hostname: row.get(2)?,
        fingerprint: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_bounds_cover_exactly_one_utc_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        let (start, end) = utc_day_bounds(now);
        assert_eq!(end - start, 24 * 60 * 60 * 1000);
        assert!(start <= now.timestamp_millis());
        assert!(now.timestamp_millis() < end);

        let midnight = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
        assert_eq!(start, midnight.timestamp_millis());
    }
}
