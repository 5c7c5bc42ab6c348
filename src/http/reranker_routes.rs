//! Reranker Service HTTP surface: the dedicated `POST /rerank` RPC that
//! `clients::RerankerClient` calls, distinct from the inference gateway's
//! OpenAI-compatible `/v1/rerank` passthrough.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::RerankerEngine;

#[derive(Clone)]
pub struct RerankerState {
    pub engine: RerankerEngine,
}

pub fn router(state: RerankerState) -> Router {
    Router::new()
        .route("/health", get(crate::http::health))
        .route("/rerank", post(rerank_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: Option<usize>,
}

#[derive(Serialize)]
struct RerankResultRow {
    index: usize,
    relevance_score: f64,
}

#[derive(Serialize)]
struct RerankResponse {
    resolved_model: String,
    results: Vec<RerankResultRow>,
}

async fn rerank_handler(State(state): State<RerankerState>, Json(req): Json<RerankRequest>) -> Result<Json<RerankResponse>> {
    let run = state.engine.rerank(&req.model, &req.query, &req.documents, req.top_n).await?;
    Ok(Json(RerankResponse {
        resolved_model: run.resolved_model,
        results: run.results.into_iter().map(|r| RerankResultRow { index: r.index, relevance_score: r.relevance_score }).collect(),
    }))
}
