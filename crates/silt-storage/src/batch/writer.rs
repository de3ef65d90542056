//! Dedicated log flusher thread fed by a bounded crossbeam channel.
//!
//! Appends go into an in-memory pending buffer; the thread drains it into
//! one batched transaction whenever the buffer crosses the batch size, a
//! caller asks for a flush, or the flush interval elapses with no traffic
//! (the channel's `recv_timeout` doubles as the periodic timer).
//!
//! Delivery is at-most-once: a batch that fails to commit is dropped, not
//! re-enqueued. A flush that times out waiting for schema readiness is the
//! exception: it fails before draining, so the buffer survives for a later
//! flush. Callers that need stronger guarantees must not rely on buffered
//! appends.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rusqlite::Connection;
use tracing::{debug, warn};

use silt_core::config::StorageConfig;
use silt_core::errors::{StorageError, StorageResult};
use silt_core::types::LogRecord;

use crate::gate::SchemaGate;
use crate::queries;

const CHANNEL_BOUND: usize = 64;

/// A command sent to the flusher thread.
enum FlushCommand {
    /// Flush pending entries (fire-and-forget).
    Flush,
    /// Flush and report the result via the provided sender.
    FlushSync(std::sync::mpsc::SyncSender<StorageResult<usize>>),
    /// Flush and shut down the thread.
    Shutdown,
}

/// The pending buffer and its flusher thread.
///
/// `append` only ever pushes to the tail; a flush drains by swapping the
/// whole Vec out, so entries appended during an in-flight flush land in
/// the next batch, never lost and never duplicated.
pub struct LogBuffer {
    pending: Arc<Mutex<Vec<LogRecord>>>,
    tx: Sender<FlushCommand>,
    handle: Option<JoinHandle<()>>,
    batch_size: usize,
}

impl LogBuffer {
    /// Spawn the flusher thread. `conn` is moved into the thread and is
    /// its dedicated connection for the thread's full lifetime.
    pub fn new(conn: Connection, gate: Arc<SchemaGate>, config: &StorageConfig) -> Self {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = bounded(CHANNEL_BOUND);

        let thread_pending = Arc::clone(&pending);
        let interval = config.flush_interval();
        let gate_timeout = config.gate_wait_timeout();
        let handle = thread::Builder::new()
            .name("silt-log-writer".to_string())
            .spawn(move || writer_loop(conn, rx, thread_pending, gate, interval, gate_timeout))
            .expect("failed to spawn log writer thread");

        Self {
            pending,
            tx,
            handle: Some(handle),
            batch_size: config.batch_size,
        }
    }

    /// Append entries to the pending buffer in the order given. Never
    /// blocks on I/O and never fails; crossing the batch size requests an
    /// asynchronous flush.
    pub fn append(&self, entries: Vec<LogRecord>) {
        if entries.is_empty() {
            return;
        }
        let len = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.extend(entries);
            pending.len()
        };
        if len >= self.batch_size {
            // A full channel means a flush is already queued.
            let _ = self.tx.try_send(FlushCommand::Flush);
        }
    }

    /// Entries currently awaiting flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Flush and block until the flusher thread reports the outcome.
    /// Returns the number of rows inserted.
    pub fn flush_sync(&self) -> StorageResult<usize> {
        let (done_tx, done_rx) = std::sync::mpsc::sync_channel(0);
        self.tx
            .send(FlushCommand::FlushSync(done_tx))
            .map_err(|_| StorageError::sqlite("log writer channel disconnected"))?;
        done_rx
            .recv()
            .map_err(|_| StorageError::sqlite("log writer thread did not respond"))?
    }

    /// Shut down the flusher thread, flushing the tail of the buffer.
    pub fn shutdown(mut self) -> StorageResult<()> {
        let _ = self.tx.send(FlushCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| StorageError::sqlite("log writer thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for LogBuffer {
    fn drop(&mut self) {
        // Signal shutdown if not already done.
        let _ = self.tx.send(FlushCommand::Shutdown);
    }
}

fn writer_loop(
    conn: Connection,
    rx: Receiver<FlushCommand>,
    pending: Arc<Mutex<Vec<LogRecord>>>,
    gate: Arc<SchemaGate>,
    interval: Duration,
    gate_timeout: Duration,
) {
    loop {
        match rx.recv_timeout(interval) {
            Ok(FlushCommand::Shutdown) => {
                log_flush_error(flush_pending(&conn, &pending, &gate, gate_timeout));
                break;
            }
            Ok(FlushCommand::Flush) => {
                log_flush_error(flush_pending(&conn, &pending, &gate, gate_timeout));
            }
            Ok(FlushCommand::FlushSync(done_tx)) => {
                let _ = done_tx.send(flush_pending(&conn, &pending, &gate, gate_timeout));
            }
            Err(RecvTimeoutError::Timeout) => {
                log_flush_error(flush_pending(&conn, &pending, &gate, gate_timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                log_flush_error(flush_pending(&conn, &pending, &gate, gate_timeout));
                break;
            }
        }
    }
}

fn log_flush_error(result: StorageResult<usize>) {
    if let Err(e) = result {
        warn!("log flush failed, batch dropped: {e}");
    }
}

/// Drain the pending buffer and persist it as one transaction.
///
/// The gate is awaited before the drain, so a schema that never becomes
/// ready leaves the buffer intact for a later flush. Once drained, the
/// batch is committed or lost; there is no retry queue.
fn flush_pending(
    conn: &Connection,
    pending: &Mutex<Vec<LogRecord>>,
    gate: &SchemaGate,
    gate_timeout: Duration,
) -> StorageResult<usize> {
    if pending.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
        return Ok(0);
    }

    // No statement before the schema exists.
    if !gate.wait_ready(gate_timeout) {
        return Err(StorageError::SchemaNotReady {
            waited_ms: gate_timeout.as_millis() as u64,
        });
    }

    let batch = {
        let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *pending)
    };
    if batch.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction().map_err(StorageError::sqlite)?;
    let inserted = queries::logs::insert_logs(&tx, &batch)?;
    tx.commit().map_err(StorageError::sqlite)?;

    debug!(rows = batch.len(), inserted, "flushed log batch");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> StorageConfig {
        StorageConfig {
            batch_size: 4,
            // Keep the periodic timer out of the picture.
            flush_interval_ms: 60_000,
            ..Default::default()
        }
    }

    fn migrated_db(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("buffer.db");
        let conn = Connection::open(&path).unwrap();
        crate::schema::run_migrations(&conn).unwrap();
        path
    }

    fn record(n: i64) -> LogRecord {
        LogRecord::new(n, "host-a", 1, "test", format!("entry {n}"))
    }

    fn count_logs(path: &std::path::Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn appends_below_threshold_stay_buffered() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        gate.mark_ready();
        let buffer = LogBuffer::new(Connection::open(&path).unwrap(), gate, &test_config());

        buffer.append(vec![record(1), record(2), record(3)]);
        assert_eq!(buffer.pending_len(), 3);
        assert_eq!(count_logs(&path), 0);
    }

    #[test]
    fn reaching_batch_size_triggers_a_flush() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        gate.mark_ready();
        let buffer = LogBuffer::new(Connection::open(&path).unwrap(), gate, &test_config());

        buffer.append((0..4).map(record).collect());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count_logs(&path) < 4 {
            assert!(
                std::time::Instant::now() < deadline,
                "threshold flush never landed"
            );
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn flush_waits_for_schema_gate() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        let buffer = LogBuffer::new(
            Connection::open(&path).unwrap(),
            Arc::clone(&gate),
            &test_config(),
        );

        // Below threshold, then an explicit flush that must park on the gate.
        buffer.append(vec![record(1), record(2)]);
        let _ = buffer.tx.try_send(FlushCommand::Flush);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(count_logs(&path), 0, "flush ran before the gate opened");

        gate.mark_ready();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count_logs(&path) < 2 {
            assert!(std::time::Instant::now() < deadline, "gated flush never landed");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn gate_timeout_keeps_the_buffer_intact() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        let config = StorageConfig {
            gate_wait_timeout_ms: 200,
            ..test_config()
        };
        let buffer = LogBuffer::new(
            Connection::open(&path).unwrap(),
            Arc::clone(&gate),
            &config,
        );

        buffer.append(vec![record(1)]);
        assert!(matches!(
            buffer.flush_sync(),
            Err(StorageError::SchemaNotReady { .. })
        ));
        assert_eq!(buffer.pending_len(), 1, "timed-out flush must not drain");
        assert_eq!(count_logs(&path), 0);

        // A late readiness signal still flushes the held-back entry.
        gate.mark_ready();
        assert_eq!(buffer.flush_sync().unwrap(), 1);
        assert_eq!(count_logs(&path), 1);
    }

    #[test]
    fn flush_sync_reports_inserted_rows_and_ignores_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        gate.mark_ready();
        let buffer = LogBuffer::new(Connection::open(&path).unwrap(), gate, &test_config());

        let correlated = record(100).with_correlation_id(7);
        buffer.append(vec![correlated.clone()]);
        assert_eq!(buffer.flush_sync().unwrap(), 1);

        // Redelivery of the same correlated entry is idempotent.
        buffer.append(vec![correlated]);
        assert_eq!(buffer.flush_sync().unwrap(), 0);
        assert_eq!(count_logs(&path), 1);
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        gate.mark_ready();
        let buffer = LogBuffer::new(Connection::open(&path).unwrap(), gate, &test_config());
        assert_eq!(buffer.flush_sync().unwrap(), 0);
    }

    #[test]
    fn appends_during_flush_land_in_next_batch() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        gate.mark_ready();
        let buffer = Arc::new(LogBuffer::new(
            Connection::open(&path).unwrap(),
            gate,
            &test_config(),
        ));

        let appenders: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..50 {
                        buffer.append(vec![record(t * 1_000 + i)]);
                    }
                })
            })
            .collect();
        for _ in 0..20 {
            let _ = buffer.flush_sync();
        }
        for handle in appenders {
            handle.join().unwrap();
        }
        buffer.flush_sync().unwrap();

        // Nothing lost, nothing duplicated.
        assert_eq!(count_logs(&path), 200);
    }

    #[test]
    fn shutdown_flushes_the_tail() {
        let dir = TempDir::new().unwrap();
        let path = migrated_db(&dir);
        let gate = Arc::new(SchemaGate::new());
        gate.mark_ready();
        let buffer = LogBuffer::new(Connection::open(&path).unwrap(), gate, &test_config());

        buffer.append(vec![record(1), record(2)]);
        buffer.shutdown().unwrap();
        assert_eq!(count_logs(&path), 2);
    }
}
