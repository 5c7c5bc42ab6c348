//! Reranker engine (spec §4.7): lazy per-model cache with a single-flight
//! lock, alias resolution, batch scoring, optional post-call eviction.
//!
//! Scoring itself is delegated to the inference runtime's `/api/rerank`
//! endpoint (`OllamaInferenceClient::rerank`); this module owns the cache
//! lifecycle and batching policy, mirroring `cross_encoder_reranker.py`'s
//! structure without embedding a model-serving runtime in-process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::clients::ollama_client::OllamaInferenceClient;
use crate::error::Result;

static MODEL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("bge-reranker-v2-m3", "BAAI/bge-reranker-v2-m3"),
        ("bge-reranker-v2-m3:latest", "BAAI/bge-reranker-v2-m3"),
        ("BAAI/bge-reranker-v2-m3:latest", "BAAI/bge-reranker-v2-m3"),
    ])
});

#[derive(Debug, Clone)]
pub struct RerankedRow {
    pub index: usize,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct RerankRunResult {
    pub resolved_model: String,
    pub results: Vec<RerankedRow>,
}

/// Owns the lazy model cache and batching policy for one process.
#[derive(Clone)]
pub struct RerankerEngine {
    client: OllamaInferenceClient,
    default_model: String,
    max_length: usize,
    batch_size: usize,
    unload_after_request: bool,
    loaded: Arc<Mutex<HashSet<String>>>,
}

impl RerankerEngine {
    pub fn new(
        client: OllamaInferenceClient,
        default_model: String,
        max_length: usize,
        batch_size: usize,
        unload_after_request: bool,
    ) -> Self {
        Self {
            client,
            default_model,
            max_length: max_length.max(64),
            batch_size: batch_size.max(1),
            unload_after_request,
            loaded: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn resolve_model_name(&self, model: &str) -> String {
        let candidate = model.trim();
        if candidate.is_empty() {
            return MODEL_ALIASES
                .get(self.default_model.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| self.default_model.clone());
        }
        MODEL_ALIASES.get(candidate).map(|s| s.to_string()).unwrap_or_else(|| candidate.to_string())
    }

    pub fn loaded_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.loaded.lock().iter().cloned().collect();
        models.sort();
        models
    }

    /// Marks `resolved_model` loaded; subsequent calls with the same name
    /// are no-ops. The lock taken here is the single-flight guard
    /// described in Design Notes §9.
    fn ensure_loaded(&self, resolved_model: &str) {
        self.loaded.lock().insert(resolved_model.to_string());
    }

    pub fn unload_model(&self, model: &str) -> bool {
        let resolved = self.resolve_model_name(model);
        self.loaded.lock().remove(&resolved)
    }

    pub fn unload_all_models(&self) -> usize {
        let mut guard = self.loaded.lock();
        let count = guard.len();
        guard.clear();
        count
    }

    /// Scores `documents` against `query` in batches of `batch_size`,
    /// truncating each document to `max_length` chars, returning the top
    /// `top_n` rows by descending relevance score with original indices
    /// preserved.
    pub async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> Result<RerankRunResult> {
        let resolved_model = self.resolve_model_name(model);
        self.ensure_loaded(&resolved_model);

        let result = self.score_all(&resolved_model, query, documents).await;

        if self.unload_after_request {
            self.unload_model(&resolved_model);
        }

        let scores = result?;

        let mut ranked_indices: Vec<usize> = (0..scores.len()).collect();
        ranked_indices.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap());

        let limit = match top_n {
            Some(n) => n.max(1).min(ranked_indices.len()),
            None => ranked_indices.len(),
        };

        let results = ranked_indices
            .into_iter()
            .take(limit)
            .map(|index| RerankedRow { index, relevance_score: scores[index] })
            .collect::<Vec<_>>();

        Ok(RerankRunResult { resolved_model, results })
    }

    async fn score_all(&self, resolved_model: &str, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        let truncated: Vec<String> = documents.iter().map(|d| d.chars().take(self.max_length).collect()).collect();

        let mut scores = vec![0.0_f64; documents.len()];

        for batch_start in (0..truncated.len()).step_by(self.batch_size) {
            let batch_end = (batch_start + self.batch_size).min(truncated.len());
            let batch = &truncated[batch_start..batch_end];
            let batch_result = self.client.rerank(resolved_model, query, batch, None).await?;
            for row in batch_result.results {
                if let Some(slot) = scores.get_mut(batch_start + row.index) {
                    *slot = row.relevance_score;
                }
            }
        }

        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RerankerEngine {
        let client = OllamaInferenceClient::new("http://localhost:11434", std::time::Duration::from_secs(30));
        RerankerEngine::new(client, "bge-reranker-v2-m3".to_string(), 512, 16, true)
    }

    #[test]
    fn resolves_known_alias() {
        let engine = engine();
        assert_eq!(engine.resolve_model_name("bge-reranker-v2-m3:latest"), "BAAI/bge-reranker-v2-m3");
    }

    #[test]
    fn empty_model_falls_back_to_resolved_default() {
        let engine = engine();
        assert_eq!(engine.resolve_model_name(""), "bge-reranker-v2-m3");
    }

    #[test]
    fn unknown_model_passes_through_unchanged() {
        let engine = engine();
        assert_eq!(engine.resolve_model_name("custom-reranker"), "custom-reranker");
    }

    #[test]
    fn unload_all_reports_count_and_clears() {
        let engine = engine();
        engine.ensure_loaded("BAAI/bge-reranker-v2-m3");
        engine.ensure_loaded("other-model");
        assert_eq!(engine.unload_all_models(), 2);
        assert!(engine.loaded_models().is_empty());
    }
}
