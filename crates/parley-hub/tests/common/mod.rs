//! Common test utilities.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use parley_core::ParleyConfig;
use parley_core::store::{EventSink, InMemoryStore, SessionStore};
use parley_core::testing::ScriptedProvider;
use parley_hub::api::{self, SharedState};
use parley_hub::gateway::{ClientEnd, Gateway, ServerMessage};
use parley_hub::tools::default_registry;

pub struct TestServer<S> {
    pub state: SharedState,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<S>,
}

fn test_config() -> ParleyConfig {
    let mut config = ParleyConfig::default();
    config.backend.timeout_secs = 2;
    config
}

/// Gateway over an arbitrary store.
pub fn test_state_with<S>(provider: ScriptedProvider, store: Arc<S>) -> TestServer<S>
where
    S: EventSink + SessionStore + 'static,
{
    let provider = Arc::new(provider);
    let state = Arc::new(Gateway::new(
        store.clone(),
        provider.clone(),
        default_registry(),
        &test_config(),
    ));
    TestServer {
        state,
        provider,
        store,
    }
}

/// Gateway over a fresh in-memory store.
pub fn test_state(provider: ScriptedProvider) -> TestServer<InMemoryStore> {
    test_state_with(provider, Arc::new(InMemoryStore::new()))
}

/// Router over a gateway.
pub fn test_app(state: &SharedState) -> Router {
    api::build_router(state.clone())
}

/// Next envelope, failing the test after two seconds.
pub async fn next_message(end: &mut ClientEnd) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), end.outbound.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("gateway closed the link")
}

pub fn send_text(end: &ClientEnd, text: &str) {
    end.inbound
        .try_send(serde_json::json!({ "message": text }).to_string())
        .unwrap();
}

/// Connect a client to the gateway, returning its id once started.
pub async fn open_client(
    state: &SharedState,
    requested: &str,
    user_id: &str,
) -> (String, ClientEnd, tokio::task::JoinHandle<()>) {
    let (link, mut end) = state.connect();
    let gateway = state.clone();
    let requested = requested.to_string();
    let user_id = user_id.to_string();
    let task = tokio::spawn(async move { gateway.serve(&requested, &user_id, link).await });

    match next_message(&mut end).await {
        ServerMessage::SessionStarted { session_id, .. } => (session_id, end, task),
        other => panic!("expected session_started, got {:?}", other),
    }
}

/// Read envelopes until `response_complete` or `error`, inclusive.
pub async fn collect_turn(end: &mut ClientEnd) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    loop {
        let msg = next_message(end).await;
        let done = matches!(
            msg,
            ServerMessage::ResponseComplete { .. } | ServerMessage::Error { .. }
        );
        out.push(msg);
        if done {
            return out;
        }
    }
}
