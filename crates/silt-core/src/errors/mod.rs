//! Error types for the storage layer.

mod storage_error;

pub use storage_error::StorageError;

/// Result alias used throughout the storage layer.
pub type StorageResult<T> = Result<T, StorageError>;
