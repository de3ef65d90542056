//! Record types shared between the storage layer and its hosts.
//!
//! Insert-side types carry no id (the store assigns one); read-side types
//! carry the id the store assigned.

use serde::{Deserialize, Serialize};

/// A log record as submitted by the caller, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    pub hostname: String,
    pub pid: i64,
    pub source: String,
    /// Severity label. Defaults to "info" when constructed via `new`.
    pub level: String,
    pub message: String,
    /// Optional serialized JSON payload.
    pub meta: Option<String>,
    /// Optional id grouping related entries (e.g. one job run).
    pub correlation_id: Option<i64>,
}

impl LogRecord {
    /// Build a minimal record with level "info" and no meta.
    pub fn new(
        created_at: i64,
        hostname: impl Into<String>,
        pid: i64,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            created_at,
            hostname: hostname.into(),
            pid,
            source: source.into(),
            level: "info".to_string(),
            message: message.into(),
            meta: None,
            correlation_id: None,
        }
    }

    /// Attach a structured meta payload, serialized to JSON.
    pub fn with_meta(mut self, meta: &serde_json::Value) -> Self {
        self.meta = Some(meta.to_string());
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: i64) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// A log record as read back from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLogRecord {
    pub id: i64,
    pub created_at: i64,
    pub hostname: String,
    pub pid: i64,
    pub source: String,
    pub level: String,
    pub message: String,
    pub meta: Option<String>,
    pub correlation_id: Option<i64>,
}

/// A notification occurrence as read from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub correlation_id: i64,
    pub hostname: String,
    /// Precomputed hash of the message content, used for dedup grouping.
    pub fingerprint: String,
    /// Unix timestamp in milliseconds, assigned by the store on insert.
    pub created_at: i64,
}

/// Result of recording a notification occurrence.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// The most recent prior occurrence for the fingerprint, if any.
    pub previous: Option<NotificationRecord>,
    /// Occurrences for the fingerprint within the current UTC day,
    /// including the one just recorded.
    pub today_count: i64,
}

/// The fixed filter set for log queries. All fields are ANDed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub hostname: Option<String>,
    pub source: Option<String>,
    pub level: Option<String>,
    pub correlation_id: Option<i64>,
    /// Inclusive lower bound on `created_at`, unix millis.
    pub since: Option<i64>,
    /// Exclusive upper bound on `created_at`, unix millis.
    pub until: Option<i64>,
    /// Maximum rows returned. Default: 500.
    pub limit: Option<usize>,
}

impl LogFilter {
    /// Returns the effective row limit, defaulting to 500.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(500)
    }
}
