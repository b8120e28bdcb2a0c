//! # Parley Hub
//!
//! Concrete collaborators for the Parley server: the Ollama backend, the
//! SQLite store, the built-in tools, and the HTTP/WebSocket gateway.

pub mod api;
pub mod background;
pub mod gateway;
pub mod metrics;
pub mod middleware;
pub mod providers;
pub mod store;
pub mod tools;

pub use gateway::{Gateway, ServerMessage};
pub use providers::OllamaProvider;
pub use store::SqliteStore;
