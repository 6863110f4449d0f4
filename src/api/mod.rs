//! HTTP transport: `POST /rpc` takes a router request and always answers
//! `200` with an envelope; `GET /health` reports liveness.

use std::future::Future;

use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::router::{Envelope, ErrorCode, RequestRouter};

pub fn create_router(router: RequestRouter) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rpc", post(rpc))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(router)
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(
    listener: TcpListener,
    router: RequestRouter,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(router))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pr-reviewer"
    }))
}

// Raw bytes rather than `Json<Value>` so bad bodies get an envelope, not a 4xx.
async fn rpc(State(router): State<RequestRouter>, body: Bytes) -> Json<Envelope> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(request) => Json(router.handle(request).await),
        Err(e) => {
            tracing::warn!("Rejected non-JSON request body: {}", e);
            Json(Envelope::fail(
                ErrorCode::InvalidRequest,
                "Invalid request format",
                Some(Value::String(e.to_string())),
            ))
        }
    }
}
