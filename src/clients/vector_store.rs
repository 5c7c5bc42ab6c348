//! Vector-store client: a collection-oriented API, matching qdrant's
//! collection/point model but reached over its plain HTTP REST surface
//! (rather than the `qdrant-client` SDK) with `reqwest`, the same way
//! the rest of this workspace talks to upstream services.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{RagError, Result};
use crate::types::VectorPointPayload;

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: VectorPointPayload,
}

/// A collection-oriented vector store. Abstracted behind a trait so the
/// retrieval/ingestion pipeline does not depend on a specific backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, collection_name: &str, vector_size: usize) -> Result<()>;
    async fn upsert_chunks(
        &self,
        collection_name: &str,
        points: Vec<(String, Vec<f32>, VectorPointPayload)>,
    ) -> Result<()>;
    async fn delete_collection(&self, collection_name: &str) -> Result<()>;
    async fn search_chunks(
        &self,
        collection_name: &str,
        query_vector: &[f32],
        limit: usize,
        document_id_filter: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>>;
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorsConfig,
}

#[derive(Serialize)]
struct VectorsConfig {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPoint {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<UpsertPoint>,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
    with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchResultRow>,
}

#[derive(Deserialize)]
struct SearchResultRow {
    id: serde_json::Value,
    score: f64,
    payload: serde_json::Value,
}

pub struct QdrantVectorStore {
    http: reqwest::Client,
    base_url: String,
}

impl QdrantVectorStore {
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

    async fn collection_exists(&self, collection_name: &str) -> Result<bool> {
        let url = format!("{}/collections/{collection_name}/exists", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = response
            .error_for_status()
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, "malformed response body"))?;
        Ok(body
            .get("result")
            .and_then(|r| r.get("exists"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, collection_name: &str, vector_size: usize) -> Result<()> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }
        let url = format!("{}/collections/{collection_name}", self.base_url);
        let body = CreateCollectionRequest {
            vectors: VectorsConfig { size: vector_size, distance: "Cosine" },
        };
        self.http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?;
        Ok(())
    }

    async fn upsert_chunks(
        &self,
        collection_name: &str,
        points: Vec<(String, Vec<f32>, VectorPointPayload)>,
    ) -> Result<()> {
        let url = format!("{}/collections/{collection_name}/points?wait=true", self.base_url);
        let body = UpsertRequest {
            points: points
                .into_iter()
                .map(|(id, vector, payload)| UpsertPoint {
                    id,
                    vector,
                    payload: serde_json::to_value(payload).unwrap_or(json!({})),
                })
                .collect(),
        };
        self.http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?;
        Ok(())
    }

    async fn delete_collection(&self, collection_name: &str) -> Result<()> {
        if !self.collection_exists(collection_name).await? {
            return Ok(());
        }
        let url = format!("{}/collections/{collection_name}", self.base_url);
        self.http
            .delete(&url)
            .send()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?;
        Ok(())
    }

    async fn search_chunks(
        &self,
        collection_name: &str,
        query_vector: &[f32],
        limit: usize,
        document_id_filter: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>> {
        if !self.collection_exists(collection_name).await? {
            return Ok(Vec::new());
        }

        let filter = document_id_filter.and_then(|ids| {
            if ids.is_empty() {
                None
            } else {
                Some(json!({
                    "must": [{ "key": "document_id", "match": { "any": ids } }]
                }))
            }
        });

        let url = format!("{}/collections/{collection_name}/points/search", self.base_url);
        let body = SearchRequest {
            vector: query_vector.to_vec(),
            limit,
            with_payload: true,
            with_vector: false,
            filter,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("VectorStoreError", e, &url))?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RagError::external("VectorStoreError", e, "malformed response body"))?;

        parsed
            .result
            .into_iter()
            .map(|row| {
                let payload: VectorPointPayload = serde_json::from_value(row.payload)
                    .map_err(|e| RagError::external("VectorStoreError", e, "malformed point payload"))?;
                Ok(ScoredPoint {
                    id: row.id.to_string(),
                    score: row.score,
                    payload,
                })
            })
            .collect()
    }
}
