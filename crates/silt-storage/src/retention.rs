//! Chunked TTL sweeps for the logs and notifications tables.
//!
//! Each target has its own re-entrancy guard: a sweep request arriving
//! while one is running is silently dropped, not queued. The guard is set
//! before any I/O and cleared on every terminating path, so an error can
//! never leave a target stuck "perpetually running". Deletion is paced in
//! bounded chunks so a large backlog does not starve concurrent traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use silt_core::config::StorageConfig;
use silt_core::errors::StorageResult;

use crate::connection::DatabaseManager;
use crate::queries;

/// Which table a sweep run targets.
#[derive(Debug, Clone, Copy)]
enum SweepTarget {
    Logs,
    Notifications,
}

impl SweepTarget {
    fn label(self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Notifications => "notifications",
        }
    }
}

/// Outcome of one sweep invocation.
#[derive(Debug, Default, Clone, Copy)]
struct SweepStats {
    chunks: usize,
    deleted: u64,
}

/// Background retention sweeper. Invoked by an external scheduler; the
/// sweeper itself owns only the chunking and concurrency contract.
pub struct RetentionSweeper {
    db: Arc<DatabaseManager>,
    chunk_size: usize,
    chunk_delay: Duration,
    ttl_default_ms: i64,
    logs_running: AtomicBool,
    notifications_running: AtomicBool,
}

impl RetentionSweeper {
    pub fn new(db: Arc<DatabaseManager>, config: &StorageConfig) -> Self {
        Self {
            db,
            chunk_size: config.sweep_chunk_size,
            chunk_delay: config.sweep_chunk_delay(),
            ttl_default_ms: config.logs_ttl_default_ms,
            logs_running: AtomicBool::new(false),
            notifications_running: AtomicBool::new(false),
        }
    }

    /// Sweep expired log rows. Errors are swallowed after logging.
    pub fn sweep_expired_logs(&self) {
        self.sweep(SweepTarget::Logs);
    }

    /// Sweep expired notification rows. Errors are swallowed after logging.
    pub fn sweep_expired_notifications(&self) {
        self.sweep(SweepTarget::Notifications);
    }

    fn guard(&self, target: SweepTarget) -> &AtomicBool {
        match target {
            SweepTarget::Logs => &self.logs_running,
            SweepTarget::Notifications => &self.notifications_running,
        }
    }

    fn sweep(&self, target: SweepTarget) {
        let guard = self.guard(target);
        if guard
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!(table = target.label(), "sweep already running, skipping");
            return;
        }

        let result = self.sweep_inner(target);
        guard.store(false, Ordering::Release);

        match result {
            Ok(stats) => debug!(
                table = target.label(),
                chunks = stats.chunks,
                deleted = stats.deleted,
                "retention sweep finished"
            ),
            Err(e) => warn!(table = target.label(), "retention sweep aborted: {e}"),
        }
    }

    /// One sweep run: read the TTL, then delete expired rows oldest-first
    /// in chunks, pausing between chunks, until a chunk comes up short.
    fn sweep_inner(&self, target: SweepTarget) -> StorageResult<SweepStats> {
        let ttl_ms = self
            .db
            .with_reader(|conn| queries::settings::logs_ttl(conn, self.ttl_default_ms))?;
        let cutoff = Utc::now().timestamp_millis() - ttl_ms;

        let mut stats = SweepStats::default();
        loop {
            let deleted = self.db.with_writer(|conn| match target {
                SweepTarget::Logs => {
                    queries::logs::delete_expired_chunk(conn, cutoff, self.chunk_size)
                }
                SweepTarget::Notifications => {
                    queries::notifications::delete_expired_chunk(conn, cutoff, self.chunk_size)
                }
            })?;

            stats.chunks += 1;
            stats.deleted += deleted as u64;

            // A short chunk means the backlog is drained.
            if deleted < self.chunk_size {
                break;
            }
            thread::sleep(self.chunk_delay);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_core::errors::StorageError;
    use tempfile::TempDir;

    fn test_sweeper(chunk_size: usize) -> (TempDir, RetentionSweeper, Arc<DatabaseManager>) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            sweep_chunk_size: chunk_size,
            sweep_chunk_delay_ms: 0,
            ..Default::default()
        };
        let db = Arc::new(DatabaseManager::open(&dir.path().join("sweep.db"), &config).unwrap());
        db.with_writer(|conn| crate::schema::run_migrations(conn).map(|_| ()))
            .unwrap();
        let sweeper = RetentionSweeper::new(Arc::clone(&db), &config);
        (dir, sweeper, db)
    }

    fn insert_logs_at(db: &DatabaseManager, created_at: i64, n: usize) {
        db.with_writer(|conn| {
            let mut stmt = conn
                .prepare(
                    "INSERT INTO logs (created_at, hostname, pid, source, level, message)
                     VALUES (?1, 'host-a', 1, 'test', 'info', 'x')",
                )
                .map_err(StorageError::sqlite)?;
            for _ in 0..n {
                stmt.execute([created_at]).map_err(StorageError::sqlite)?;
            }
            Ok(())
        })
        .unwrap();
    }

    fn log_count(db: &DatabaseManager) -> i64 {
        db.with_reader(queries::logs::count_logs).unwrap()
    }

    #[test]
    fn backlog_of_2500_takes_exactly_three_chunks() {
        let (_dir, sweeper, db) = test_sweeper(1000);
        insert_logs_at(&db, 0, 2500); // far past any TTL

        let stats = sweeper.sweep_inner(SweepTarget::Logs).unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.deleted, 2500);
        assert_eq!(log_count(&db), 0);
    }

    #[test]
    fn empty_backlog_is_one_empty_chunk() {
        let (_dir, sweeper, db) = test_sweeper(1000);
        let now = Utc::now().timestamp_millis();
        insert_logs_at(&db, now, 10); // fresh rows, not expired

        let stats = sweeper.sweep_inner(SweepTarget::Logs).unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(log_count(&db), 10);
    }

    #[test]
    fn sweep_while_running_is_a_no_op() {
        let (_dir, sweeper, db) = test_sweeper(1000);
        insert_logs_at(&db, 0, 50);

        sweeper.logs_running.store(true, Ordering::SeqCst);
        sweeper.sweep_expired_logs();
        assert_eq!(log_count(&db), 50, "guarded sweep must not touch rows");
        assert!(
            sweeper.logs_running.load(Ordering::SeqCst),
            "skipped sweep must leave the guard unchanged"
        );

        sweeper.logs_running.store(false, Ordering::SeqCst);
        sweeper.sweep_expired_logs();
        assert_eq!(log_count(&db), 0);
        assert!(!sweeper.logs_running.load(Ordering::SeqCst));
    }

    #[test]
    fn sweep_error_is_swallowed_and_clears_the_guard() {
        let (_dir, sweeper, db) = test_sweeper(1000);
        db.with_writer(|conn| {
            conn.execute_batch("DROP TABLE logs")
                .map_err(StorageError::sqlite)
        })
        .unwrap();

        // Must return, not panic or propagate, despite the missing table.
        sweeper.sweep_expired_logs();
        assert!(
            !sweeper.logs_running.load(Ordering::SeqCst),
            "aborted sweep must clear the guard"
        );

        // The other target is untouched and still sweepable.
        db.with_writer(|conn| {
            conn.execute(
                "INSERT INTO notifications (correlation_id, hostname, fingerprint, created_at)
                 VALUES (1, 'host-a', 'fp', 0)",
                [],
            )
            .map_err(StorageError::sqlite)
        })
        .unwrap();
        sweeper.sweep_expired_notifications();
        let notif_count: i64 = db
            .with_reader(|conn| {
                conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
                    .map_err(StorageError::sqlite)
            })
            .unwrap();
        assert_eq!(notif_count, 0);
    }

    #[test]
    fn targets_are_independent() {
        let (_dir, sweeper, db) = test_sweeper(1000);
        insert_logs_at(&db, 0, 5);
        db.with_writer(|conn| {
            conn.execute(
                "INSERT INTO notifications (correlation_id, hostname, fingerprint, created_at)
                 VALUES (1, 'host-a', 'fp', 0)",
                [],
            )
            .map_err(StorageError::sqlite)
        })
        .unwrap();

        // Holding the logs guard must not block the notifications sweep.
        sweeper.logs_running.store(true, Ordering::SeqCst);
        sweeper.sweep_expired_notifications();

        let notif_count: i64 = db
            .with_reader(|conn| {
                conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
                    .map_err(StorageError::sqlite)
            })
            .unwrap();
        assert_eq!(notif_count, 0);
        assert_eq!(log_count(&db), 5);
    }
}
