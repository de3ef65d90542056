//! Storage configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hardcoded TTL default: 14 days in milliseconds.
pub const DEFAULT_LOGS_TTL_MS: i64 = 14 * 24 * 60 * 60 * 1000;

/// Configuration for the storage adapter.
///
/// Durations are expressed in milliseconds on the serde surface so hosts
/// can pass plain integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Buffered entries that trigger an early flush. Default: 100.
    pub batch_size: usize,
    /// Periodic flush interval in milliseconds. Default: 1000.
    pub flush_interval_ms: u64,
    /// TTL applied when the settings table has no (or an unparsable)
    /// "logsTTL" value. Default: 14 days.
    pub logs_ttl_default_ms: i64,
    /// Rows deleted per retention sweep chunk. Default: 1000.
    pub sweep_chunk_size: usize,
    /// Pause between sweep chunks in milliseconds. Default: 10_000.
    pub sweep_chunk_delay_ms: u64,
    /// Upper bound on how long a flush waits for schema readiness.
    /// Default: 30_000.
    pub gate_wait_timeout_ms: u64,
    /// Read pool size. Default: 2.
    pub read_pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 1_000,
            logs_ttl_default_ms: DEFAULT_LOGS_TTL_MS,
            sweep_chunk_size: 1_000,
            sweep_chunk_delay_ms: 10_000,
            gate_wait_timeout_ms: 30_000,
            read_pool_size: 2,
        }
    }
}

impl StorageConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn sweep_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_chunk_delay_ms)
    }

    pub fn gate_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.gate_wait_timeout_ms)
    }
}
