//! Query and invalidation handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::error::GatewayError;
use super::state::HandlerState;
use crate::cache::CacheBackend;
use crate::embedding::EmbeddingClient;
use crate::hashing;
use crate::index::{LexicalIndexClient, VectorIndexClient};
use crate::pipeline::QueryRequest;
use crate::rerank::CrossEncoderClient;

/// Response header listing the cache tiers that served a hit.
pub const CACHE_TIERS_HEADER: &str = "x-braid-cache";

#[instrument(skip(state, request), fields(tenant = %request.tenant_id))]
pub async fn query_handler<L, V, E, C, B>(
    State(state): State<HandlerState<L, V, E, C, B>>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, GatewayError>
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    let response = state.engine.query(request).await?;

    let mut headers = HeaderMap::new();
    let tiers = response.cache_hit_tiers.join(",");
    if let Ok(value) = HeaderValue::from_str(&tiers) {
        headers.insert(CACHE_TIERS_HEADER, value);
    }

    Ok((headers, Json(response)).into_response())
}

/// What to purge. Tenant purges take the raw tenant id and hash it the same
/// way the key composer does, so external tooling never needs the hash.
#[derive(Debug, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum InvalidateRequest {
    /// Legal-hold or deletion event for one tenant.
    Tenant { tenant_id: String },
    /// Embedding model upgrade.
    EmbeddingModel { model_version: String },
    /// Reranker model upgrade.
    RerankModel { model_version: String },
    /// Data-contract version bump.
    All,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub purged: String,
}

#[instrument(skip(state))]
pub async fn invalidate_handler<L, V, E, C, B>(
    State(state): State<HandlerState<L, V, E, C, B>>,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, GatewayError>
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    let cache = state.engine.cache();
    let purged = match request {
        InvalidateRequest::Tenant { tenant_id } => {
            if tenant_id.trim().is_empty() {
                return Err(GatewayError::InvalidRequest("tenant_id is empty".to_string()));
            }
            let tenant_hash = hashing::hash_tenant_id(tenant_id.trim());
            cache.purge_tenant(tenant_hash).await;
            format!("tenant:{tenant_hash:016x}")
        }
        InvalidateRequest::EmbeddingModel { model_version } => {
            cache.purge_embedding_model(&model_version).await;
            format!("embedding_model:{model_version}")
        }
        InvalidateRequest::RerankModel { model_version } => {
            cache.purge_rerank_model(&model_version).await;
            format!("rerank_model:{model_version}")
        }
        InvalidateRequest::All => {
            cache.purge_all().await;
            "all".to_string()
        }
    };

    info!(purged = %purged, "cache invalidated");
    Ok(Json(InvalidateResponse { purged }))
}
