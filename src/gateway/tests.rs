use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{CACHE_TIERS_HEADER, HandlerState, create_router_with_state};
use crate::cache::{MockCacheBackend, SemanticCache};
use crate::embedding::MockEmbeddingClient;
use crate::hashing;
use crate::index::{MockLexicalIndex, MockVectorIndex, RankedDoc};
use crate::pipeline::{PipelineConfig, RetrievalEngine};
use crate::rerank::{MockCrossEncoder, RerankerClient, RerankerConfig};

const TENANT: &str = "acme";

fn router() -> Router {
    router_with_docs(5)
}

fn router_with_docs(n: usize) -> Router {
    let engine = RetrievalEngine::new(
        MockLexicalIndex::new(),
        MockVectorIndex::new(),
        MockEmbeddingClient::new(),
        RerankerClient::new(MockCrossEncoder::new(), RerankerConfig::default()),
        SemanticCache::new(MockCacheBackend::new()),
        PipelineConfig::default(),
    );
    let tenant_hash = hashing::hash_tenant_id(TENANT);
    let docs: Vec<RankedDoc> = (0..n)
        .map(|i| RankedDoc::new(format!("c{i}"), 10.0 - i as f32).with_text(format!("chunk body {i}")))
        .collect();
    engine.lexical().seed(tenant_hash, docs.clone());
    engine.vector().seed(tenant_hash, docs);
    create_router_with_state(HandlerState::new(Arc::new(engine)))
}

fn query_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_healthz_is_ok() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ready_reports_components() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/ready")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["components"]["lexical"], true);
    assert_eq!(body["components"]["cache"], true);
}

#[tokio::test]
async fn test_query_returns_ranked_candidates() {
    let response = router()
        .oneshot(query_request(json!({
            "query_text": "what is the refund policy",
            "tenant_id": TENANT,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["degraded"], false);
    assert_eq!(body["low_confidence"], false);
    assert_eq!(body["route"], "simple");
    assert_eq!(body["candidates"].as_array().unwrap().len(), 5);
    assert_eq!(body["candidates"][0]["rank"], 1);
    assert!(body["latency_breakdown"]["total_ms"].is_u64());
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let response = router()
        .oneshot(query_request(json!({
            "query_text": "   ",
            "tenant_id": TENANT,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_repeat_query_sets_cache_header() {
    let router = router();
    let first = router
        .clone()
        .oneshot(query_request(json!({
            "query_text": "what is the refund policy",
            "tenant_id": TENANT,
        })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .oneshot(query_request(json!({
            "query_text": "what is the refund policy",
            "tenant_id": TENANT,
        })))
        .await
        .unwrap();
    let header = second
        .headers()
        .get(CACHE_TIERS_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(header.contains("fused"), "header was {header:?}");
}

#[tokio::test]
async fn test_tenant_invalidation_purges_fused_entries() {
    let router = router();
    // Prime the fused tier.
    router
        .clone()
        .oneshot(query_request(json!({
            "query_text": "what is the refund policy",
            "tenant_id": TENANT,
        })))
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/invalidate")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"scope": "tenant", "tenant_id": TENANT}).to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The repeat query recomputes instead of hitting the fused tier.
    let after = router
        .oneshot(query_request(json!({
            "query_text": "what is the refund policy",
            "tenant_id": TENANT,
        })))
        .await
        .unwrap();
    let header = after
        .headers()
        .get(CACHE_TIERS_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(!header.contains("fused"), "header was {header:?}");
}

#[tokio::test]
async fn test_invalidate_rejects_empty_tenant() {
    let response = router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/invalidate")
                .header("content-type", "application/json")
                .body(Body::from(json!({"scope": "tenant", "tenant_id": ""}).to_string()))
                .expect("request builds"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
