//! Buffered log writes: pending buffer plus a dedicated flusher thread.

mod writer;

pub use writer::LogBuffer;
