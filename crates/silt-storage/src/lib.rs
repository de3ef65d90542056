//! # silt-storage
//!
//! SQLite persistence layer for the silt log adapter.
//! WAL mode, write-serialized + read-pooled, buffered batch log writer,
//! chunked retention sweeps, transactional notification dedup.

pub mod batch;
pub mod connection;
pub mod engine;
pub mod gate;
pub mod queries;
pub mod retention;
pub mod schema;

pub use connection::DatabaseManager;
pub use engine::SiltStorageEngine;
pub use gate::SchemaGate;
