//! Trait seams for the storage layer.

pub mod storage;

pub use storage::{ILogStore, INotificationStore, IRetentionStore};
