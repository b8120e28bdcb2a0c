//! Durable session and event storage.

pub mod sqlite;

pub use sqlite::SqliteStore;
