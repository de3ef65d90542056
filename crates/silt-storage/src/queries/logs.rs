//! logs table queries.

use rusqlite::{params, Connection, ToSql};

use silt_core::errors::{StorageError, StorageResult};
use silt_core::types::{LogFilter, LogRecord, StoredLogRecord};

/// Insert a batch of log records, preserving slice order.
/// Duplicate (correlation_id, created_at) pairs are silently ignored so
/// redelivery by the caller is idempotent. Returns rows actually inserted.
pub fn insert_logs(conn: &Connection, records: &[LogRecord]) -> StorageResult<usize> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO logs
             (created_at, hostname, pid, source, level, message, meta, correlation_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(StorageError::sqlite)?;

    let mut inserted = 0;
    for rec in records {
        inserted += stmt
            .execute(params![
                rec.created_at,
                rec.hostname,
                rec.pid,
                rec.source,
                rec.level,
                rec.message,
                rec.meta,
                rec.correlation_id,
            ])
            .map_err(StorageError::sqlite)?;
    }
    Ok(inserted)
}

/// Filtered read over persisted logs, newest first (descending id).
pub fn query_logs(conn: &Connection, filter: &LogFilter) -> StorageResult<Vec<StoredLogRecord>> {
    let mut sql = String::from(
        "SELECT id, created_at, hostname, pid, source, level, message, meta, correlation_id
         FROM logs WHERE 1=1",
    );
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(hostname) = &filter.hostname {
        sql.push_str(" AND hostname = ?");
        values.push(Box::new(hostname.clone()));
    }
    if let Some(source) = &filter.source {
        sql.push_str(" AND source = ?");
        values.push(Box::new(source.clone()));
    }
    if let Some(level) = &filter.level {
        sql.push_str(" AND level = ?");
        values.push(Box::new(level.clone()));
    }
    if let Some(correlation_id) = filter.correlation_id {
        sql.push_str(" AND correlation_id = ?");
        values.push(Box::new(correlation_id));
    }
    if let Some(since) = filter.since {
        sql.push_str(" AND created_at >= ?");
        values.push(Box::new(since));
    }
    if let Some(until) = filter.until {
        sql.push_str(" AND created_at < ?");
        values.push(Box::new(until));
    }
    sql.push_str(" ORDER BY id DESC LIMIT ?");
    values.push(Box::new(filter.effective_limit() as i64));

    let mut stmt = conn.prepare(&sql).map_err(StorageError::sqlite)?;
    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = stmt
        .query_map(&refs[..], map_log_row)
        .map_err(StorageError::sqlite)?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(StorageError::sqlite)?);
    }
    Ok(result)
}

/// Delete up to `limit` log rows older than `cutoff`, oldest ids first.
/// Returns the number of rows deleted.
pub fn delete_expired_chunk(
    conn: &Connection,
    cutoff: i64,
    limit: usize,
) -> StorageResult<usize> {
    conn.execute(
        "DELETE FROM logs WHERE id IN
         (SELECT id FROM logs WHERE created_at < ?1 ORDER BY id LIMIT ?2)",
        params![cutoff, limit as i64],
    )
    .map_err(StorageError::sqlite)
}

/// Count total log rows.
pub fn count_logs(conn: &Connection) -> StorageResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
        .map_err(StorageError::sqlite)
}

fn map_log_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredLogRecord> {
    Ok(StoredLogRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        hostname: row.get(2)?,
        pid: row.get(3)?,
        source: row.get(4)?,
        level: row.get(5)?,
        message: row.get(6)?,
        meta: row.get(7)?,
        correlation_id: row.get(8)?,
    })
}
