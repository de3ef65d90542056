//! Storage-layer errors for SQLite operations.

/// Errors that can occur in the storage layer.
///
/// An absent or unparsable TTL setting is deliberately NOT an error:
/// it is recovered locally with the hardcoded default and logged at warn.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("Migration failed at version {version}: {message}")]
    MigrationFailed { version: u32, message: String },

    #[error("Schema not ready after {waited_ms} ms")]
    SchemaNotReady { waited_ms: u64 },

    #[error("Operation not supported: {operation} ({reason})")]
    NotSupported { operation: String, reason: String },
}

impl StorageError {
    /// Wrap any displayable error as a `SqliteError`.
    pub fn sqlite(e: impl std::fmt::Display) -> Self {
        Self::SqliteError {
            message: e.to_string(),
        }
    }
}
