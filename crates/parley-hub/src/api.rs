//! HTTP server: the WebSocket chat endpoint plus read-only inspection routes.
//!
//! Endpoints:
//! - GET /health: Health check with the active model
//! - GET /session/{id}: Logged events of a session
//! - GET /sessions?user_id=: Live session ids of a user
//! - GET /metrics: Runtime counters
//! - GET /ws/session/{id}?user_id=: Chat session over WebSocket

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use parley_core::event::Event;

use crate::gateway::{ClientEnd, Gateway};
use crate::middleware::logging_middleware;

pub type SharedState = Arc<Gateway>;

/// Events returned by `GET /session/{id}`.
pub const SESSION_EVENTS_LIMIT: usize = 50;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

#[derive(Serialize)]
pub struct SessionEventsResponse {
    pub session_id: String,
    pub events_count: usize,
    pub events: Vec<Event>,
}

#[derive(Serialize)]
pub struct UserSessionsResponse {
    pub user_id: String,
    pub sessions: Vec<String>,
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

// ─── Handlers ──────────────────────────────────────────────

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.model(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn session_events(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEventsResponse>, ApiError> {
    let events = state
        .store()
        .fetch_events(&session_id, Some(SESSION_EVENTS_LIMIT))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(SessionEventsResponse {
        session_id,
        events_count: events.len(),
        events,
    }))
}

async fn user_sessions(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserSessionsResponse>, ApiError> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "user_id is required"))?;

    let mut sessions: Vec<String> = state
        .registry()
        .list_user_sessions(&user_id)
        .into_iter()
        .collect();
    sessions.sort();

    Ok(Json(UserSessionsResponse { user_id, sessions }))
}

async fn metrics(State(state): State<SharedState>) -> Json<Value> {
    Json(state.metrics().to_json(state.registry().len()))
}

async fn ws_session(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, user_id))
}

/// Pump one WebSocket through the gateway.
async fn handle_socket(socket: WebSocket, state: SharedState, session_id: String, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (link, end) = state.connect();
    let ClientEnd {
        inbound,
        mut outbound,
        closed,
    } = end;

    // Peer frames -> gateway. Ends on close, error, or gateway shutdown.
    let reader_closed = closed.clone();
    let reader = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = reader_closed.cancelled() => break,
                frame = receiver.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    // Waits while the gateway is busy with a turn.
                    let delivered = tokio::select! {
                        _ = reader_closed.cancelled() => false,
                        sent = inbound.send(text.to_string()) => sent.is_ok(),
                    };
                    if !delivered {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket read error: {}", e);
                    break;
                }
            }
        }
        reader_closed.cancel();
    });

    // Gateway envelopes -> peer. Ends when the gateway drops its side.
    let writer_closed = closed.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode envelope: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                writer_closed.cancel();
                break;
            }
        }
        let _ = sender.close().await;
    });

    state.serve(&session_id, &user_id, link).await;

    closed.cancel();
    let _ = writer.await;
    let _ = reader.await;
    debug!("WebSocket connection closed");
}

// ─── Server builder ────────────────────────────────────────

/// Build the API router.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session/{id}", get(session_events))
        .route("/sessions", get(user_sessions))
        .route("/metrics", get(metrics))
        .route("/ws/session/{id}", get(ws_session))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Serve until Ctrl-C, then drain connections and pending summaries.
pub async fn start_server(state: SharedState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Parley listening on http://{} (model {})", addr, state.model());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!(
        "Shutdown requested, {} connection(s) and {} background task(s) pending",
        state.connection_count(),
        state.background().pending_count()
    );
    // Upgraded sockets are not tracked by the listener; end them here so the
    // graceful drain can complete.
    state.shutdown().await;
}
