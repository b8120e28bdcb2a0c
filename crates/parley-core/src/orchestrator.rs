//! Streaming orchestrator: drives one user turn through the backend.
//!
//! A turn runs in two phases:
//! 1. Tool check: one non-streaming request with the tool schema. Every
//!    requested tool is executed once, logged, and its result appended to the
//!    context. No second tool round is offered.
//! 2. Streaming: one streaming request with the (possibly tool-augmented)
//!    context; text is forwarded as it arrives and logged as a single
//!    `ai_response` event once the backend signals completion.
//!
//! The turn is exposed as a lazy [`FragmentStream`]. Nothing happens until it
//! is polled, and dropping it cancels the turn: a turn that never reaches the
//! end-of-stream marker leaves no `ai_response` behind.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{ParleyError, Result};
use crate::event::{self, EventType};
use crate::message::{ChatMessage, ToolCall};
use crate::provider::{ChatRequest, ChatStream, LlmProvider, StreamEvent};
use crate::store::EventSink;
use crate::tool::ToolRegistry;

/// One piece of output handed to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// A tool was invoked during the tool-check phase.
    ToolCall { name: String, args: Value },
    /// Incremental answer text.
    Text(String),
    /// The turn failed; always the last fragment of its turn.
    Error(String),
}

impl Fragment {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Lazy, finite stream of fragments for one turn.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    /// Model override (None = provider default).
    pub model: Option<String>,
    pub temperature: f32,
    /// Bound on the tool-check call and on every streaming read.
    pub timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: None,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Drives turns against the backend. Cheap to clone.
#[derive(Clone)]
pub struct StreamingOrchestrator {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    events: Arc<dyn EventSink>,
    config: OrchestratorConfig,
}

impl StreamingOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        events: Arc<dyn EventSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            events,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Model name reported to clients.
    pub fn model(&self) -> &str {
        self.config
            .model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Start a turn.
    ///
    /// `context` is the session's recent history, ending with the user turn
    /// being answered; `user_content` is that turn's text, recorded on every
    /// event the turn emits.
    pub fn run_turn(
        &self,
        session_id: &str,
        context: Vec<ChatMessage>,
        user_content: &str,
    ) -> FragmentStream {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(ChatMessage::system(&self.config.system_prompt));
        messages.extend(context);

        let turn = Turn {
            ctx: TurnContext {
                orchestrator: self.clone(),
                session_id: session_id.to_string(),
                query: user_content.to_string(),
            },
            messages,
            accumulated: String::new(),
            phase: Phase::ToolCheck,
        };

        Box::pin(futures::stream::unfold(turn, |mut turn| async move {
            turn.next_fragment().await.map(|fragment| (fragment, turn))
        }))
    }
}

enum Phase {
    ToolCheck,
    Announce(VecDeque<Fragment>),
    Streaming(ChatStream),
    Finished,
}

/// Immutable part of a turn, shared by every await point.
struct TurnContext {
    orchestrator: StreamingOrchestrator,
    session_id: String,
    query: String,
}

struct Turn {
    ctx: TurnContext,
    messages: Vec<ChatMessage>,
    accumulated: String,
    phase: Phase,
}

impl Turn {
    async fn next_fragment(&mut self) -> Option<Fragment> {
        let timeout = self.ctx.orchestrator.config.timeout;
        loop {
            match &mut self.phase {
                Phase::ToolCheck => match self.ctx.tool_check(&mut self.messages).await {
                    Ok(announcements) => self.phase = Phase::Announce(announcements),
                    Err(e) => return Some(self.fail(e)),
                },
                Phase::Announce(pending) => {
                    if let Some(fragment) = pending.pop_front() {
                        return Some(fragment);
                    }
                    match self.ctx.open_stream(&self.messages).await {
                        Ok(stream) => self.phase = Phase::Streaming(stream),
                        Err(e) => return Some(self.fail(e)),
                    }
                }
                Phase::Streaming(stream) => {
                    let item = match tokio::time::timeout(timeout, stream.next()).await {
                        Ok(item) => item,
                        Err(_) => {
                            return Some(self.fail(ParleyError::BackendUnavailable(format!(
                                "no data from backend for {}s",
                                timeout.as_secs()
                            ))));
                        }
                    };
                    match item {
                        Some(Ok(StreamEvent::Delta(text))) => {
                            if text.is_empty() {
                                continue;
                            }
                            self.accumulated.push_str(&text);
                            return Some(Fragment::Text(text));
                        }
                        Some(Ok(StreamEvent::Done)) => {
                            self.phase = Phase::Finished;
                            let response = std::mem::take(&mut self.accumulated);
                            self.ctx.complete(&response).await;
                            return None;
                        }
                        Some(Err(ParleyError::BackendProtocol(reason))) => {
                            warn!(session_id = %self.ctx.session_id, "Skipping malformed stream line: {}", reason);
                        }
                        Some(Err(e)) => return Some(self.fail(e)),
                        None => {
                            return Some(self.fail(ParleyError::BackendProtocol(
                                "stream ended without a done marker".to_string(),
                            )));
                        }
                    }
                }
                Phase::Finished => return None,
            }
        }
    }

    fn fail(&mut self, e: ParleyError) -> Fragment {
        self.phase = Phase::Finished;
        self.accumulated.clear();
        error!(session_id = %self.ctx.session_id, "Turn failed: {}", e);
        let message = match &e {
            ParleyError::BackendUnavailable(_) => {
                format!("Cannot reach the model backend. {}", e)
            }
            _ => format!("Model backend error. {}", e),
        };
        Fragment::Error(message)
    }
}

impl TurnContext {
    fn request(&self, messages: &[ChatMessage], with_tools: bool) -> ChatRequest {
        let config = &self.orchestrator.config;
        ChatRequest {
            messages: messages.to_vec(),
            tools: if with_tools {
                self.orchestrator.tools.definitions()
            } else {
                Vec::new()
            },
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    /// Phase 1. Returns one announcement per executed tool call.
    async fn tool_check(&self, messages: &mut Vec<ChatMessage>) -> Result<VecDeque<Fragment>> {
        let timeout = self.orchestrator.config.timeout;
        let request = self.request(messages, true);
        let response = tokio::time::timeout(timeout, self.orchestrator.provider.chat(request))
            .await
            .map_err(|_| {
                ParleyError::BackendUnavailable(format!(
                    "tool check timed out after {}s",
                    timeout.as_secs()
                ))
            })??;

        if !response.has_tool_calls() {
            debug!(session_id = %self.session_id, "No tool calls requested");
            return Ok(VecDeque::new());
        }

        let calls: Vec<ToolCall> = response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", i);
                }
                call.function.arguments = call.function.args();
                call
            })
            .collect();

        info!(
            session_id = %self.session_id,
            "Model requested {} tool call(s)",
            calls.len()
        );

        messages.push(ChatMessage::assistant_with_tools(&response.content, calls.clone()));

        let mut announcements = VecDeque::with_capacity(calls.len());
        for call in calls {
            let name = call.function.name;
            let args = call.function.arguments;

            self.log(EventType::FunctionCall, event::function_call(&name, &args, &self.query))
                .await;

            let result = self.orchestrator.tools.invoke(&name, args.clone()).await;

            self.log(EventType::ToolResult, event::tool_result(&name, &result, &self.query))
                .await;

            messages.push(ChatMessage::tool_result(&call.id, &result.to_string()));
            announcements.push_back(Fragment::ToolCall { name, args });
        }

        Ok(announcements)
    }

    /// Phase 2 request. The tool schema is not offered again.
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChatStream> {
        let timeout = self.orchestrator.config.timeout;
        let request = self.request(messages, false);
        tokio::time::timeout(timeout, self.orchestrator.provider.chat_stream(request))
            .await
            .map_err(|_| {
                ParleyError::BackendUnavailable(format!(
                    "stream request timed out after {}s",
                    timeout.as_secs()
                ))
            })?
    }

    async fn complete(&self, response: &str) {
        info!(
            session_id = %self.session_id,
            "Response complete ({} chars)",
            response.len()
        );
        self.log(EventType::AiResponse, event::ai_response(response, &self.query))
            .await;
    }

    /// Best-effort event logging.
    async fn log(&self, event_type: EventType, payload: Value) {
        if let Err(e) = self
            .orchestrator
            .events
            .append(&self.session_id, event_type, payload)
            .await
        {
            warn!(
                session_id = %self.session_id,
                "Failed to log {} event: {}",
                event_type,
                e
            );
        }
    }
}

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant with access to tools. Use them when they help answer the user. \
Respond naturally and concisely, and incorporate tool results into your answer.";
