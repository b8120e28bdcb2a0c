//! Post-session summarization.
//!
//! Reads a closed session's event log, renders it as a plain transcript and
//! asks the backend for a short summary, which is stored on the session
//! record. One backend call per session.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::event::{Event, EventType};
use crate::message::ChatMessage;
use crate::provider::{ChatRequest, LlmProvider};
use crate::store::SessionStore;

/// Summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Transcript characters sent to the model.
    #[serde(default = "default_transcript_chars")]
    pub max_transcript_chars: usize,
    /// Stored summary is cut to this many characters.
    #[serde(default = "default_summary_chars")]
    pub max_summary_chars: usize,
    /// Limit on the summary backend call.
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
}

fn default_transcript_chars() -> usize {
    3000
}

fn default_summary_chars() -> usize {
    500
}

fn default_summary_timeout() -> u64 {
    60
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_transcript_chars: default_transcript_chars(),
            max_summary_chars: default_summary_chars(),
            timeout_secs: default_summary_timeout(),
        }
    }
}

impl SummaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Produces and stores session summaries.
#[derive(Clone)]
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn SessionStore>,
    model: Option<String>,
    config: SummaryConfig,
}

impl Summarizer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn SessionStore>,
        model: Option<String>,
        config: SummaryConfig,
    ) -> Self {
        Self {
            provider,
            store,
            model,
            config,
        }
    }

    /// Summarize a session and store the result.
    ///
    /// Returns `Ok(None)` when the log holds nothing worth summarizing.
    pub async fn summarize(&self, session_id: &str) -> Result<Option<String>> {
        info!(session_id = %session_id, "Generating session summary");

        let events = self.store.fetch_events(session_id, None).await?;
        let transcript = build_transcript(&events);
        if transcript.trim().is_empty() {
            info!(session_id = %session_id, "No messages to summarize");
            return Ok(None);
        }

        let prompt = format!(
            "Summarize this conversation in 2-3 sentences. Focus on the main topics discussed and key outcomes.\n\n\
Conversation:\n{}\n\nSummary:",
            truncate_chars(&transcript, self.config.max_transcript_chars)
        );

        let request = ChatRequest {
            messages: vec![ChatMessage::user(&prompt)],
            model: self.model.clone(),
            ..Default::default()
        };
        let timeout = self.config.timeout();
        let response = tokio::time::timeout(timeout, self.provider.chat(request))
            .await
            .map_err(|_| {
                ParleyError::BackendUnavailable(format!(
                    "summary request timed out after {}s",
                    timeout.as_secs()
                ))
            })??;

        let summary = truncate_chars(response.content.trim(), self.config.max_summary_chars).to_string();
        if summary.is_empty() {
            return Err(ParleyError::BackendProtocol("empty summary".to_string()));
        }

        self.store.update_summary(session_id, &summary).await?;
        info!(session_id = %session_id, "Summary saved ({} chars)", summary.len());
        Ok(Some(summary))
    }

    /// Summarize, logging and swallowing any failure.
    pub async fn run(&self, session_id: &str) -> Option<String> {
        match self.summarize(session_id).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(session_id = %session_id, "Summary generation failed: {}", e);
                None
            }
        }
    }
}

/// Render events as a plain-text transcript.
pub fn build_transcript(events: &[Event]) -> String {
    let mut out = String::new();
    for event in events {
        let content = &event.content;
        let line = match event.event_type {
            EventType::UserMessage => format!("User: {}", content["content"].as_str().unwrap_or_default()),
            EventType::FunctionCall => format!(
                "[Tool called: {}]",
                content["function"].as_str().unwrap_or("unknown")
            ),
            EventType::ToolResult => format!("[Tool result: {}]", content["result"]),
            EventType::AiResponse => format!(
                "Assistant: {}",
                content["response"].as_str().unwrap_or_default()
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Cut `s` to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
