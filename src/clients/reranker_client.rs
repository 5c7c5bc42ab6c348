//! Orchestrator-side RPC client for the dedicated reranker service
//! (`POST /rerank`) — distinct from the inference gateway's
//! OpenAI-compatible `/api/rerank` route.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

#[derive(Debug, Clone)]
pub struct RerankResultRow {
    pub index: usize,
    pub relevance_score: f64,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_n: Option<usize>,
}

#[derive(Deserialize)]
struct RerankApiResultRow {
    index: usize,
    relevance_score: f64,
}

#[derive(Deserialize)]
struct RerankApiResponse {
    resolved_model: String,
    results: Vec<RerankApiResultRow>,
}

/// Result of one RPC rerank call: the model the reranker service actually
/// resolved `model` to (alias resolution happens server-side) plus the
/// reordered rows.
#[derive(Debug, Clone)]
pub struct RerankClientResult {
    pub resolved_model: String,
    pub results: Vec<RerankResultRow>,
}

#[derive(Clone)]
pub struct RerankerClient {
    http: reqwest::Client,
    base_url: String,
}

impl RerankerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> Result<RerankClientResult> {
        let url = format!("{}/rerank", self.base_url);
        let body = RerankRequest { model, query, documents, top_n };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::external("RerankerApiError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("RerankerApiError", e, &url))?;

        let parsed: RerankApiResponse = response
            .json()
            .await
            .map_err(|e| RagError::external("RerankerApiError", e, "malformed response body"))?;

        Ok(RerankClientResult {
            resolved_model: parsed.resolved_model,
            results: parsed
                .results
                .into_iter()
                .map(|r| RerankResultRow { index: r.index, relevance_score: r.relevance_score })
                .collect(),
        })
    }
}
