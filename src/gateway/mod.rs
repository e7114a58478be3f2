//! HTTP gateway (Axum) for the retrieval engine.
//!
//! Routes: `/healthz`, `/ready`, `POST /v1/query`, `POST /admin/invalidate`.

pub mod error;
pub mod handler;
pub mod state;

#[cfg(test)]
mod tests;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub use error::{ErrorResponse, GatewayError};
pub use handler::{CACHE_TIERS_HEADER, InvalidateRequest, InvalidateResponse};
pub use state::HandlerState;

use crate::cache::CacheBackend;
use crate::embedding::EmbeddingClient;
use crate::index::{LexicalIndexClient, VectorIndexClient};
use crate::pipeline::ReadyReport;
use crate::rerank::CrossEncoderClient;

pub fn create_router_with_state<L, V, E, C, B>(state: HandlerState<L, V, E, C, B>) -> Router
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/v1/query", post(handler::query_handler))
        .route("/admin/invalidate", post(handler::invalidate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(serde::Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub components: ReadyReport,
}

#[tracing::instrument]
pub async fn health_handler() -> Response {
    (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
}

#[tracing::instrument(skip(state))]
pub async fn ready_handler<L, V, E, C, B>(
    State(state): State<HandlerState<L, V, E, C, B>>,
) -> Response
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    let components = state.engine.readiness().await;
    let (status_code, status) = if components.all_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "pending")
    };

    (status_code, Json(ReadyResponse { status, components })).into_response()
}
