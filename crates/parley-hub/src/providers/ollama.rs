//! Ollama provider: `/api/chat` with native tool calling and NDJSON streaming.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use parley_core::error::{ParleyError, Result};
use parley_core::message::{ChatMessage, FunctionCall, LlmResponse, ToolCall};
use parley_core::provider::{BackendConfig, ChatRequest, ChatStream, LlmProvider, StreamEvent, ToolDefinition};

/// Client for a local or remote Ollama server.
pub struct OllamaProvider {
    client: Client,
    config: BackendConfig,
    api_url: String,
}

impl OllamaProvider {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let api_url = format!("{}/api/chat", config.url.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            api_url,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> ApiRequest<'a> {
        ApiRequest {
            model: request.model.as_deref().unwrap_or(&self.config.model),
            messages: &request.messages,
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
            stream,
            options: ApiOptions {
                temperature: request.temperature,
            },
        }
    }

    async fn send(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response> {
        let resp = self.client.post(&self.api_url).json(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiError>(&text)
            .map(|e| e.error)
            .unwrap_or_else(|_| text.chars().take(200).collect());
        Err(ParleyError::BackendProtocol(format!(
            "Ollama error ({}): {}",
            status, detail
        )))
    }
}

/// Request body for `/api/chat`.
#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    stream: bool,
    options: ApiOptions,
}

#[derive(Serialize)]
struct ApiOptions {
    temperature: f32,
}

/// One response object; a whole reply when not streaming, one line otherwise.
#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    message: Option<ApiMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

/// Decode a non-streaming `/api/chat` body.
pub fn parse_chat_response(body: &str) -> Result<LlmResponse> {
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return Err(ParleyError::BackendProtocol(format!("Ollama error: {}", err.error)));
    }
    let resp: ApiResponse = serde_json::from_str(body).map_err(|e| {
        ParleyError::BackendProtocol(format!(
            "Failed to parse response: {} (body: {})",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })?;
    let message = resp
        .message
        .ok_or_else(|| ParleyError::BackendProtocol("No message in response".to_string()))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            function: FunctionCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            },
        })
        .collect();

    Ok(LlmResponse {
        content: message.content,
        tool_calls,
        model: resp.model,
    })
}

/// Decode one NDJSON line of a streaming response.
///
/// Blank lines yield nothing. A line that is not a response object yields
/// `BackendProtocol`, which callers skip. An `{"error": ..}` line ends the
/// stream with a hard error.
pub fn parse_stream_line(line: &str) -> Vec<Result<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    if let Ok(err) = serde_json::from_str::<ApiError>(line) {
        return vec![Err(ParleyError::Other(format!("Ollama error: {}", err.error)))];
    }
    let chunk: ApiResponse = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![Err(ParleyError::BackendProtocol(format!(
                "bad stream line: {}",
                e
            )))];
        }
    };

    let mut events = Vec::with_capacity(2);
    if let Some(message) = chunk.message.filter(|m| !m.content.is_empty()) {
        events.push(Ok(StreamEvent::Delta(message.content)));
    }
    if chunk.done {
        events.push(Ok(StreamEvent::Done));
    }
    events
}

fn stream_error(e: std::io::Error) -> ParleyError {
    if e.kind() == std::io::ErrorKind::InvalidData {
        ParleyError::BackendProtocol(format!("undecodable stream line: {}", e))
    } else {
        ParleyError::BackendUnavailable(format!("stream interrupted: {}", e))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        let body = self.body(&request, false);
        info!("Calling Ollama model: {} ({} tools)", body.model, request.tools.len());

        let resp = self.send(&body).await?;
        let text = resp.text().await?;
        debug!("Ollama response body length: {}", text.len());
        parse_chat_response(&text)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let body = self.body(&request, true);
        info!("Streaming from Ollama model: {}", body.model);

        let resp = self.send(&body).await?;
        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = LinesStream::new(tokio::io::BufReader::new(StreamReader::new(bytes)).lines());

        let events = lines.flat_map(|line| {
            let items = match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => vec![Err(stream_error(e))],
            };
            futures::stream::iter(items)
        });
        Ok(Box::pin(events))
    }
}
