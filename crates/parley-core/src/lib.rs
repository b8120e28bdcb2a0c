//! # Parley Core
//!
//! Shared types, traits, and the turn engine for the Parley conversation
//! server. Transport and storage backends live in `parley-hub`.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod router;
pub mod session;
pub mod store;
pub mod summarizer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tool;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use event::{Event, EventType};
pub use message::{ChatMessage, Role};
pub use orchestrator::{Fragment, StreamingOrchestrator};
pub use provider::LlmProvider;
pub use router::{IntentRouter, Route};
pub use session::{Session, SessionRegistry, SharedSession};
pub use store::{EventSink, InMemoryStore, SessionStore};
pub use summarizer::Summarizer;
pub use tool::{Tool, ToolRegistry};
