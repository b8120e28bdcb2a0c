//! Model backends.

pub mod ollama;

pub use ollama::OllamaProvider;
