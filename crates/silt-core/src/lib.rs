//! # silt-core
//!
//! Foundation crate for the silt log persistence adapter.
//! Defines record types, storage traits, errors, and configuration.
//! The storage crate depends on this; hosts can depend on it alone to
//! mock the adapter behind the storage traits.

pub mod config;
pub mod errors;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::StorageConfig;
pub use errors::{StorageError, StorageResult};
pub use types::{DedupOutcome, LogFilter, LogRecord, NotificationRecord, StoredLogRecord};
