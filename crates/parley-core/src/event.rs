//! Session events: the append-only log a conversation leaves behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Kind of a logged event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserMessage,
    AiResponse,
    FunctionCall,
    ToolResult,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserMessage => "user_message",
            Self::AiResponse => "ai_response",
            Self::FunctionCall => "function_call",
            Self::ToolResult => "tool_result",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_message" => Ok(Self::UserMessage),
            "ai_response" => Ok(Self::AiResponse),
            "function_call" => Ok(Self::FunctionCall),
            "tool_result" => Ok(Self::ToolResult),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// A persisted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub event_type: EventType,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

// Payload builders. Field names are part of the stored format.

pub fn user_message(content: &str) -> Value {
    json!({ "role": "user", "content": content })
}

pub fn function_call(function: &str, args: &Value, query: &str) -> Value {
    json!({ "function": function, "args": args, "query": query })
}

pub fn tool_result(function: &str, result: &Value, query: &str) -> Value {
    json!({ "function": function, "result": result, "query": query })
}

pub fn ai_response(response: &str, responded_to_query: &str) -> Value {
    json!({ "response": response, "responded_to_query": responded_to_query })
}
