//! Session gateway: the per-connection message loop.
//!
//! A connection is seen through a [`ClientLink`]: raw inbound text, outbound
//! envelopes, and a cancellation token that fires when the peer goes away.
//! The transport adapter (see `api`) owns the socket; everything here is
//! transport-agnostic so it can be driven directly in tests.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use parley_core::config::{ParleyConfig, SessionSettings};
use parley_core::error::{ParleyError, Result};
use parley_core::event::{self, EventType};
use parley_core::message::Role;
use parley_core::orchestrator::{Fragment, StreamingOrchestrator};
use parley_core::provider::LlmProvider;
use parley_core::router::{IntentRouter, Route};
use parley_core::session::{SessionRegistry, SharedSession, lock_session};
use parley_core::store::{EventSink, SessionStore};
use parley_core::summarizer::{Summarizer, truncate_chars};
use parley_core::tool::ToolRegistry;

use crate::background::BackgroundTasks;
use crate::metrics::{SharedMetrics, new_metrics};

/// Outbound envelope, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted {
        session_id: String,
        user_id: String,
        model: String,
        message: String,
    },
    ResponseStart {
        intent: Route,
        model: String,
    },
    ResponseChunk {
        chunk: String,
    },
    ResponseComplete {
        message_count: usize,
        total_exchanges: usize,
    },
    Error {
        error: String,
    },
}

impl ServerMessage {
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Chunk announcing a tool invocation.
    pub fn tool_announcement(function: &str, args: &Value) -> Self {
        Self::ResponseChunk {
            chunk: json!({
                "type": "function_call",
                "function": function,
                "args": args,
            })
            .to_string(),
        }
    }
}

/// Inbound client payload.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub message: String,
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ParleyError::MalformedClientInput(e.to_string()))
    }
}

/// Gateway side of a client connection.
pub struct ClientLink {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<ServerMessage>,
    closed: CancellationToken,
}

/// Transport side of a client connection.
pub struct ClientEnd {
    /// Raw text frames from the peer. Full while a turn is running and the
    /// peer keeps sending.
    pub inbound: mpsc::Sender<String>,
    /// Envelopes to write to the peer. Closes when the gateway is done.
    pub outbound: mpsc::Receiver<ServerMessage>,
    /// Cancel when the peer disconnects or a write fails.
    pub closed: CancellationToken,
}

/// The peer is gone; stop the loop.
#[derive(Debug)]
struct Disconnected;

impl ClientLink {
    async fn send(&self, message: ServerMessage) -> std::result::Result<(), Disconnected> {
        if self.outbound.send(message).await.is_err() {
            self.closed.cancel();
            return Err(Disconnected);
        }
        Ok(())
    }
}

/// Shared collaborators for every connection.
pub struct Gateway {
    registry: SessionRegistry,
    orchestrator: StreamingOrchestrator,
    router: IntentRouter,
    events: Arc<dyn EventSink>,
    store: Arc<dyn SessionStore>,
    summarizer: Summarizer,
    settings: SessionSettings,
    metrics: SharedMetrics,
    background: BackgroundTasks,
    connections: TaskTracker,
    shutdown: CancellationToken,
}

const INBOUND_BUFFER: usize = 16;
const OUTBOUND_BUFFER: usize = 64;

impl Gateway {
    pub fn new<S>(
        store: Arc<S>,
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        config: &ParleyConfig,
    ) -> Self
    where
        S: EventSink + SessionStore + 'static,
    {
        let events: Arc<dyn EventSink> = store.clone();
        let sessions: Arc<dyn SessionStore> = store;
        let orchestrator = StreamingOrchestrator::new(
            provider.clone(),
            Arc::new(tools),
            events.clone(),
            config.orchestrator(),
        );
        let summarizer = Summarizer::new(
            provider,
            sessions.clone(),
            Some(config.backend.model.clone()),
            config.summary.clone(),
        );
        Self {
            registry: SessionRegistry::new(sessions.clone()),
            orchestrator,
            router: IntentRouter::default(),
            events,
            store: sessions,
            summarizer,
            settings: config.session.clone(),
            metrics: new_metrics(),
            background: BackgroundTasks::new(),
            connections: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    pub fn model(&self) -> &str {
        self.orchestrator.model()
    }

    /// Live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// A fresh link pair. The link is cancelled on gateway shutdown.
    pub fn connect(&self) -> (ClientLink, ClientEnd) {
        let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let closed = self.shutdown.child_token();
        (
            ClientLink {
                inbound: in_rx,
                outbound: out_tx,
                closed: closed.clone(),
            },
            ClientEnd {
                inbound: in_tx,
                outbound: out_rx,
                closed,
            },
        )
    }

    /// Reuse `requested` if it names a live session, otherwise create one.
    pub async fn open_session(&self, requested: &str, user_id: &str) -> Result<String> {
        if self.registry.get_session(requested).is_some() {
            info!(session_id = %requested, "Resuming live session");
            return Ok(requested.to_string());
        }
        let session_id = self.registry.create_session(user_id).await?;
        self.metrics.record_session_opened();
        Ok(session_id)
    }

    /// Run one connection to completion.
    pub async fn serve(&self, requested: &str, user_id: &str, link: ClientLink) {
        self.connections
            .track_future(self.run_connection(requested, user_id, link))
            .await
    }

    async fn run_connection(&self, requested: &str, user_id: &str, mut link: ClientLink) {
        info!(requested = %requested, user_id = %user_id, "Client connected");

        let session_id = match self.open_session(requested, user_id).await {
            Ok(id) => id,
            Err(e) => {
                error!(user_id = %user_id, "Failed to create session: {}", e);
                let _ = link.send(ServerMessage::error(e.to_string())).await;
                return;
            }
        };

        if let Some(session) = self.registry.get_session(&session_id) {
            let started = ServerMessage::SessionStarted {
                session_id: session_id.clone(),
                user_id: user_id.to_string(),
                model: self.model().to_string(),
                message: "Session initialized. Start sending messages!".to_string(),
            };
            if link.send(started).await.is_ok() {
                match self.message_loop(&session_id, &session, &mut link).await {
                    Ok(()) => info!(session_id = %session_id, "Session ended"),
                    Err(Disconnected) => info!(session_id = %session_id, "Client disconnected"),
                }
            }
        }

        self.teardown(&session_id);
    }

    async fn message_loop(
        &self,
        session_id: &str,
        session: &SharedSession,
        link: &mut ClientLink,
    ) -> std::result::Result<(), Disconnected> {
        loop {
            let raw = tokio::select! {
                biased;
                _ = link.closed.cancelled() => return Err(Disconnected),
                raw = link.inbound.recv() => raw.ok_or(Disconnected)?,
            };

            let message = match ClientMessage::parse(&raw) {
                Ok(message) => message,
                Err(e) => {
                    warn!(session_id = %session_id, "Invalid client message: {}", e);
                    self.metrics.record_client_error();
                    link.send(ServerMessage::error("Invalid message format")).await?;
                    continue;
                }
            };

            let text = message.message.trim();
            if text.is_empty() {
                debug!(session_id = %session_id, "Empty message received, skipping");
                if lock_session(session).is_expired(self.settings.timeout_secs) {
                    info!(session_id = %session_id, "Session expired");
                    return Ok(());
                }
                continue;
            }

            self.handle_turn(session_id, session, text, link).await?;
        }
    }

    async fn handle_turn(
        &self,
        session_id: &str,
        session: &SharedSession,
        text: &str,
        link: &ClientLink,
    ) -> std::result::Result<(), Disconnected> {
        let route = self.router.classify(text);
        let context = {
            let mut s = lock_session(session);
            s.add_message(Role::User, text).map(|()| {
                s.set_route(route);
                s.recent_context(self.settings.max_context_messages)
            })
        };
        let context = match context {
            Ok(context) => context,
            Err(e) => return link.send(ServerMessage::error(e.to_string())).await,
        };

        info!(
            session_id = %session_id,
            intent = %route,
            "Message from user: {}",
            truncate_chars(text, 50)
        );
        self.log_event(session_id, EventType::UserMessage, event::user_message(text))
            .await;
        self.record_activity(session_id).await;

        link.send(ServerMessage::ResponseStart {
            intent: route,
            model: self.model().to_string(),
        })
        .await?;

        let mut turn = self.orchestrator.run_turn(session_id, context, text);
        let mut answer = String::new();
        let mut failure = None;
        loop {
            let fragment = tokio::select! {
                biased;
                _ = link.closed.cancelled() => {
                    info!(session_id = %session_id, "Connection dropped mid-turn");
                    return Err(Disconnected);
                }
                fragment = turn.next() => fragment,
            };
            match fragment {
                None => break,
                Some(Fragment::Text(chunk)) => {
                    answer.push_str(&chunk);
                    link.send(ServerMessage::ResponseChunk { chunk }).await?;
                }
                Some(Fragment::ToolCall { name, args }) => {
                    self.metrics.record_tool_call();
                    link.send(ServerMessage::tool_announcement(&name, &args)).await?;
                }
                Some(Fragment::Error(message)) => failure = Some(message),
            }
        }

        if let Some(message) = failure {
            self.metrics.record_turn(false);
            return link.send(ServerMessage::error(message)).await;
        }
        self.metrics.record_turn(true);

        let (added, message_count, total_exchanges) = {
            let mut s = lock_session(session);
            let added = s.add_message(Role::Assistant, &answer).is_ok();
            (added, s.message_count(), s.exchange_count())
        };
        if added {
            self.record_activity(session_id).await;
        } else {
            warn!(session_id = %session_id, "Backend returned an empty answer");
        }

        link.send(ServerMessage::ResponseComplete {
            message_count,
            total_exchanges,
        })
        .await
    }

    /// Close and remove the session, then schedule its summary.
    ///
    /// Only the connection that actually removes the session schedules one;
    /// other connections sharing the id find it already gone.
    fn teardown(&self, session_id: &str) {
        self.registry.close_session(session_id);
        if self.registry.remove_session(session_id).is_none() {
            debug!(session_id = %session_id, "Session already removed");
            return;
        }
        self.metrics.record_session_closed();

        let summarizer = self.summarizer.clone();
        let metrics = self.metrics.clone();
        let id = session_id.to_string();
        self.background.spawn(async move {
            if summarizer.run(&id).await.is_some() {
                metrics.record_summary();
            }
        });
    }

    async fn log_event(&self, session_id: &str, event_type: EventType, payload: Value) {
        if let Err(e) = self.events.append(session_id, event_type, payload).await {
            warn!(session_id = %session_id, "Failed to log {} event: {}", event_type, e);
        }
    }

    async fn record_activity(&self, session_id: &str) {
        if let Err(e) = self.store.record_activity(session_id, 1).await {
            warn!(session_id = %session_id, "Failed to update session record: {}", e);
        }
    }

    /// Cancel every connection, wait for them to tear down, then wait for
    /// scheduled summaries.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.connections.close();
        self.connections.wait().await;
        self.background.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::provider::StreamEvent;
    use parley_core::store::InMemoryStore;
    use parley_core::testing::{ScriptedProvider, StreamScript, tool_reply};
    use std::time::Duration;

    use crate::tools::default_registry;

    struct Harness {
        gateway: Arc<Gateway>,
        provider: Arc<ScriptedProvider>,
        store: Arc<InMemoryStore>,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        harness_with(provider, ParleyConfig::default())
    }

    fn harness_with(provider: ScriptedProvider, mut config: ParleyConfig) -> Harness {
        config.backend.timeout_secs = 1;
        let provider = Arc::new(provider);
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(Gateway::new(
            store.clone(),
            provider.clone(),
            default_registry(),
            &config,
        ));
        Harness {
            gateway,
            provider,
            store,
        }
    }

    fn start(h: &Harness, requested: &str) -> (ClientEnd, tokio::task::JoinHandle<()>) {
        let (link, end) = h.gateway.connect();
        let gateway = h.gateway.clone();
        let requested = requested.to_string();
        let task = tokio::spawn(async move { gateway.serve(&requested, "alice", link).await });
        (end, task)
    }

    async fn next(end: &mut ClientEnd) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(2), end.outbound.recv())
            .await
            .expect("timed out waiting for envelope")
            .expect("gateway closed the link")
    }

    fn say(end: &ClientEnd, text: &str) {
        end.inbound
            .try_send(json!({ "message": text }).to_string())
            .unwrap();
    }

    fn session_id_of(msg: &ServerMessage) -> String {
        match msg {
            ServerMessage::SessionStarted { session_id, .. } => session_id.clone(),
            other => panic!("expected session_started, got {:?}", other),
        }
    }

    fn summary_requests(provider: &ScriptedProvider) -> usize {
        provider
            .requests()
            .iter()
            .filter(|r| {
                !r.streaming
                    && r.request.tools.is_empty()
                    && r.request.messages[0].content.starts_with("Summarize")
            })
            .count()
    }

    #[test]
    fn test_envelope_wire_format() {
        let msg = ServerMessage::ResponseStart {
            intent: Route::Weather,
            model: "m".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "response_start", "intent": "weather", "model": "m"})
        );

        let chunk = ServerMessage::tool_announcement("get_weather", &json!({"location": "Paris"}));
        let ServerMessage::ResponseChunk { chunk } = chunk else {
            panic!("expected chunk");
        };
        let inner: Value = serde_json::from_str(&chunk).unwrap();
        assert_eq!(inner["type"], "function_call");
        assert_eq!(inner["args"]["location"], "Paris");

        assert_eq!(
            serde_json::to_value(ServerMessage::error("x")).unwrap(),
            json!({"type": "error", "error": "x"})
        );
    }

    #[test]
    fn test_client_message_parsing() {
        assert_eq!(ClientMessage::parse(r#"{"message":" hi "}"#).unwrap().message, " hi ");
        assert_eq!(ClientMessage::parse("{}").unwrap().message, "");
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ParleyError::MalformedClientInput(_))
        ));
        assert!(ClientMessage::parse(r#"{"message": 5}"#).is_err());
    }

    #[tokio::test]
    async fn test_weather_turn_end_to_end() {
        let h = harness(
            ScriptedProvider::new()
                .reply(tool_reply(&[("get_weather", json!({"location": "Paris"}))]))
                .stream_text(&["It is sunny ", "in Paris."]),
        );
        let (mut end, task) = start(&h, "new");
        let session_id = session_id_of(&next(&mut end).await);

        say(&end, "  What's the weather in Paris?  ");
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseStart {
                intent: Route::Weather,
                model: "qwen2.5:3b".into()
            }
        );
        assert_eq!(
            next(&mut end).await,
            ServerMessage::tool_announcement("get_weather", &json!({"location": "Paris"}))
        );
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseChunk {
                chunk: "It is sunny ".into()
            }
        );
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseChunk {
                chunk: "in Paris.".into()
            }
        );
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseComplete {
                message_count: 2,
                total_exchanges: 1
            }
        );

        let events = h.store.fetch_events(&session_id, None).await.unwrap();
        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::UserMessage,
                EventType::FunctionCall,
                EventType::ToolResult,
                EventType::AiResponse
            ]
        );
        assert_eq!(events[0].content["content"], "What's the weather in Paris?");
        assert_eq!(h.store.get(&session_id).await.unwrap().unwrap().message_count, 2);

        end.closed.cancel();
        task.await.unwrap();
        h.gateway.background().shutdown().await;
        assert!(h.gateway.registry().is_empty());
        assert_eq!(summary_requests(&h.provider), 1);
    }

    #[tokio::test]
    async fn test_invalid_json_keeps_loop_alive() {
        let h = harness(ScriptedProvider::new().stream_text(&["hello"]));
        let (mut end, task) = start(&h, "new");
        next(&mut end).await;

        end.inbound.try_send("not json".into()).unwrap();
        assert_eq!(next(&mut end).await, ServerMessage::error("Invalid message format"));

        say(&end, "hi");
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseStart { .. }));
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseChunk { .. }));
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseComplete { .. }));

        end.closed.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_refused_keeps_session_open() {
        let h = harness(
            ScriptedProvider::new()
                .reply_error(ParleyError::BackendUnavailable("connection refused".into()))
                .stream_text(&["recovered"]),
        );
        let (mut end, task) = start(&h, "new");
        let session_id = session_id_of(&next(&mut end).await);

        say(&end, "hello");
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseStart { .. }));
        match next(&mut end).await {
            ServerMessage::Error { error } => assert!(error.contains("Cannot reach")),
            other => panic!("expected error envelope, got {:?}", other),
        }
        assert!(h.gateway.registry().get_session(&session_id).is_some());
        assert!(
            !h.store
                .all_events()
                .iter()
                .any(|e| e.event_type == EventType::AiResponse)
        );

        // The next turn works.
        say(&end, "again");
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseStart { .. }));
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseChunk {
                chunk: "recovered".into()
            }
        );
        // The failed turn left only the user message in history.
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseComplete {
                message_count: 3,
                total_exchanges: 1
            }
        );

        end.closed.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_mid_stream() {
        let h = harness(ScriptedProvider::new().stream(StreamScript::EventsThenHang(vec![Ok(
            StreamEvent::Delta("partial".into()),
        )])));
        let (mut end, task) = start(&h, "new");
        let session_id = session_id_of(&next(&mut end).await);

        say(&end, "tell me a story");
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseStart { .. }));
        assert_eq!(
            next(&mut end).await,
            ServerMessage::ResponseChunk {
                chunk: "partial".into()
            }
        );

        end.closed.cancel();
        task.await.unwrap();
        h.gateway.background().shutdown().await;

        assert!(h.gateway.registry().get_session(&session_id).is_none());
        assert!(h.gateway.registry().is_consistent());
        assert!(
            !h.store
                .all_events()
                .iter()
                .any(|e| e.event_type == EventType::AiResponse)
        );
        assert_eq!(summary_requests(&h.provider), 1);
    }

    #[tokio::test]
    async fn test_store_failure_on_create_closes_connection() {
        let h = harness(ScriptedProvider::new());
        h.store.set_unavailable(true);
        let (mut end, task) = start(&h, "new");

        match next(&mut end).await {
            ServerMessage::Error { error } => assert!(error.contains("Store unavailable")),
            other => panic!("expected error envelope, got {:?}", other),
        }
        task.await.unwrap();
        assert!(end.outbound.recv().await.is_none());
        assert!(h.gateway.registry().is_empty());
    }

    #[tokio::test]
    async fn test_live_session_is_reused() {
        let h = harness(ScriptedProvider::new());
        let existing = h.gateway.open_session("ignored", "alice").await.unwrap();

        let (mut end, task) = start(&h, &existing);
        assert_eq!(session_id_of(&next(&mut end).await), existing);
        assert_eq!(h.gateway.registry().len(), 1);

        end.closed.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_session_is_summarized_once() {
        let h = harness(ScriptedProvider::new().stream_text(&["hello"]));
        let existing = h.gateway.open_session("ignored", "alice").await.unwrap();

        let (mut first, first_task) = start(&h, &existing);
        let (mut second, second_task) = start(&h, &existing);
        assert_eq!(session_id_of(&next(&mut first).await), existing);
        assert_eq!(session_id_of(&next(&mut second).await), existing);

        say(&first, "hi");
        assert!(matches!(next(&mut first).await, ServerMessage::ResponseStart { .. }));
        assert!(matches!(next(&mut first).await, ServerMessage::ResponseChunk { .. }));
        assert!(matches!(next(&mut first).await, ServerMessage::ResponseComplete { .. }));

        first.closed.cancel();
        first_task.await.unwrap();
        second.closed.cancel();
        second_task.await.unwrap();
        h.gateway.background().shutdown().await;

        assert!(h.gateway.registry().is_empty());
        assert_eq!(summary_requests(&h.provider), 1);
        assert_eq!(h.gateway.metrics().to_json(0)["sessions"]["closed"], 1);
    }

    #[tokio::test]
    async fn test_inbound_queue_is_bounded() {
        let h = harness(ScriptedProvider::new().stream(StreamScript::EventsThenHang(vec![])));
        let (mut end, task) = start(&h, "new");
        next(&mut end).await;

        say(&end, "tell me a story");
        assert!(matches!(next(&mut end).await, ServerMessage::ResponseStart { .. }));

        // The turn is stuck, so nothing drains the queue past its capacity.
        let accepted = (0..INBOUND_BUFFER * 4)
            .take_while(|i| {
                end.inbound
                    .try_send(json!({ "message": i.to_string() }).to_string())
                    .is_ok()
            })
            .count();
        assert_eq!(accepted, INBOUND_BUFFER);

        end.closed.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_message_on_expired_session_ends_loop() {
        let mut config = ParleyConfig::default();
        config.session.timeout_secs = 0;
        let h = harness_with(ScriptedProvider::new(), config);
        let (mut end, task) = start(&h, "new");
        next(&mut end).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        say(&end, "   ");
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not end")
            .unwrap();
        assert!(h.gateway.registry().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_drains_connections() {
        let h = harness(ScriptedProvider::new());
        let (mut end, task) = start(&h, "new");
        next(&mut end).await;

        h.gateway.shutdown().await;
        task.await.unwrap();
        assert_eq!(h.gateway.connection_count(), 0);
        assert!(h.gateway.registry().is_empty());
        // Nothing was said, so no summary was requested.
        assert_eq!(summary_requests(&h.provider), 0);
    }
}
