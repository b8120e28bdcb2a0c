//! HTTP middleware.

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info};

/// Paths polled often enough that per-request logs are noise.
const QUIET_PATHS: &[&str] = &["/health", "/metrics"];

/// Log method, path, status and latency of every request.
///
/// WebSocket upgrades are logged when the handshake answers, not when the
/// socket closes; the gateway logs the session itself.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    if QUIET_PATHS.contains(&path.as_str()) {
        debug!(%method, %path, status, latency_ms, "request");
    } else {
        info!(%method, %path, status, latency_ms, "request");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_passes_response_through() {
        let app = Router::new()
            .route("/teapot", get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }))
            .layer(axum::middleware::from_fn(logging_middleware));

        let response = app
            .oneshot(Request::get("/teapot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let missing = Router::new()
            .layer(axum::middleware::from_fn(logging_middleware))
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
