//! Scripted backend for tests. Built with `cfg(test)` or the `testing` feature.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::error::{ParleyError, Result};
use crate::message::{FunctionCall, LlmResponse, ToolCall};
use crate::provider::{ChatRequest, ChatStream, LlmProvider, StreamEvent};

/// What one streaming call should produce.
pub enum StreamScript {
    /// Yield the items, then end.
    Events(Vec<Result<StreamEvent>>),
    /// Yield the items, then never produce anything again.
    EventsThenHang(Vec<Result<StreamEvent>>),
    /// Fail the request itself.
    Fail(ParleyError),
}

/// What one non-streaming call should produce.
enum ReplyScript {
    Reply(Result<LlmResponse>),
    /// Never answer.
    Hang,
}

/// A request as the provider saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub streaming: bool,
    pub request: ChatRequest,
}

/// Provider that replays queued replies.
///
/// With an empty queue, `chat` answers with no tool calls and `chat_stream`
/// answers with a bare end-of-stream marker.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ReplyScript>>,
    streams: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next non-streaming call.
    pub fn reply(self, response: LlmResponse) -> Self {
        lock(&self.replies).push_back(ReplyScript::Reply(Ok(response)));
        self
    }

    /// Queue a failure for the next non-streaming call.
    pub fn reply_error(self, error: ParleyError) -> Self {
        lock(&self.replies).push_back(ReplyScript::Reply(Err(error)));
        self
    }

    /// Queue a non-streaming call that never returns.
    pub fn reply_hang(self) -> Self {
        lock(&self.replies).push_back(ReplyScript::Hang);
        self
    }

    /// Queue the next streaming call.
    pub fn stream(self, script: StreamScript) -> Self {
        lock(&self.streams).push_back(script);
        self
    }

    /// Queue a streaming call that yields `chunks` then the done marker.
    pub fn stream_text(self, chunks: &[&str]) -> Self {
        self.stream(StreamScript::Events(text_events(chunks)))
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

/// Delta events for `chunks`, followed by the done marker.
pub fn text_events(chunks: &[&str]) -> Vec<Result<StreamEvent>> {
    chunks
        .iter()
        .map(|c| Ok(StreamEvent::Delta(c.to_string())))
        .chain(std::iter::once(Ok(StreamEvent::Done)))
        .collect()
}

/// A response requesting the given tool calls.
pub fn tool_reply(calls: &[(&str, Value)]) -> LlmResponse {
    LlmResponse {
        content: String::new(),
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                id: format!("tc_{}", i),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: args.clone(),
                },
            })
            .collect(),
        model: "scripted".to_string(),
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        lock(&self.requests).push(RecordedRequest {
            streaming: false,
            request,
        });
        let next = lock(&self.replies).pop_front();
        match next {
            Some(ReplyScript::Reply(reply)) => reply,
            Some(ReplyScript::Hang) => futures::future::pending().await,
            None => Ok(LlmResponse {
                model: "scripted".to_string(),
                ..Default::default()
            }),
        }
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        lock(&self.requests).push(RecordedRequest {
            streaming: true,
            request,
        });
        let next = lock(&self.streams).pop_front();
        match next {
            None => Ok(Box::pin(futures::stream::iter(vec![Ok(StreamEvent::Done)]))),
            Some(StreamScript::Events(items)) => Ok(Box::pin(futures::stream::iter(items))),
            Some(StreamScript::EventsThenHang(items)) => Ok(Box::pin(
                futures::stream::iter(items).chain(futures::stream::pending()),
            )),
            Some(StreamScript::Fail(e)) => Err(e),
        }
    }
}
