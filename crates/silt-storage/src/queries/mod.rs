//! Parameterized queries, one module per table.

pub mod logs;
pub mod notifications;
pub mod settings;
