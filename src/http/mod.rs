//! HTTP surface shared by all four binaries (spec §6): route wiring,
//! health, operation-id extraction, and SSE framing for the orchestrator's
//! streamed chat endpoints.

pub mod ingestion_routes;
pub mod inference_routes;
pub mod rag_routes;
pub mod reranker_routes;
pub mod session_routes;

use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

/// `GET /health` liveness probe, identical across services.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolves the operation id an endpoint scopes its cancellation under.
/// `X-Operation-Id` is optional (spec §6): a request that omits it still
/// runs under a freshly minted id the caller simply has no way to cancel.
pub fn operation_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-operation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
