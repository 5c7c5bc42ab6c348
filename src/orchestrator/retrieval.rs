//! Hybrid Retrieval Service (spec §4.6): validate request, load approved
//! chunks, embed the query once, dense search, BM25 over the loaded
//! candidates, fuse, and aggregate to document summaries.

use std::collections::HashMap;

use crate::clients::ollama_client::OllamaInferenceClient;
use crate::clients::vector_store::VectorStore;
use crate::error::{RagError, Result};
use crate::search::{fuse, score_sparse, SparseCandidate};
use crate::storage::{queries, Storage};
use crate::types::{HybridCandidateChunk, SourceDocument};

pub struct RetrievalRequest<'a> {
    pub project_id: &'a str,
    pub query: &'a str,
    pub document_ids: &'a [String],
    pub top_k: usize,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
    pub dense_weight: f64,
    pub embedding_model: &'a str,
}

pub struct RetrievalOutcome {
    pub hybrid_candidates: Vec<HybridCandidateChunk>,
    pub documents: Vec<SourceDocument>,
}

/// Runs the full retrieval pipeline for one request.
pub async fn retrieve(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    inference: &OllamaInferenceClient,
    request: RetrievalRequest<'_>,
) -> Result<RetrievalOutcome> {
    let project = storage.with_connection(|conn| queries::require_project(conn, request.project_id))?;
    storage.with_connection(|conn| queries::validate_document_filter(conn, request.project_id, request.document_ids))?;

    let rows = storage.with_connection(|conn| {
        queries::load_approved_chunks(conn, request.project_id, request.document_ids)
    })?;

    if rows.is_empty() {
        return Ok(RetrievalOutcome { hybrid_candidates: Vec::new(), documents: Vec::new() });
    }

    let embedding = inference
        .embed(request.embedding_model, &[request.query.to_string()])
        .await?;
    let query_vector = embedding
        .embeddings
        .into_iter()
        .next()
        .ok_or_else(|| RagError::ExternalService("embedding response contained no vectors".into()))?;

    let document_filter = if request.document_ids.is_empty() { None } else { Some(request.document_ids) };
    let scored_points = vector_store
        .search_chunks(&project.collection_name, &query_vector, request.dense_top_k, document_filter)
        .await?;

    let mut dense_scores: HashMap<String, f64> = HashMap::new();
    for point in scored_points {
        let key = format!("{}:{}", point.payload.document_id, point.payload.chunk_index);
        let entry = dense_scores.entry(key).or_insert(point.score);
        if point.score > *entry {
            *entry = point.score;
        }
    }

    let chunk_keys: Vec<String> = rows.iter().map(|(chunk, _)| chunk.chunk_key()).collect();
    let sparse_candidates: Vec<SparseCandidate<'_>> = rows
        .iter()
        .zip(chunk_keys.iter())
        .map(|((chunk, _), key)| SparseCandidate { chunk_key: key.as_str(), text: chunk.contextualized_chunk.as_str() })
        .collect();
    let sparse_scores = score_sparse(request.query, &sparse_candidates, request.sparse_top_k);

    let candidate_rows: Vec<(String, String, String, i64, String, String)> = rows
        .iter()
        .map(|(chunk, doc)| {
            (
                chunk.chunk_key(),
                chunk.document_id.clone(),
                doc.name.clone(),
                chunk.chunk_index,
                chunk.context_header.clone().unwrap_or_default(),
                chunk.contextualized_chunk.clone(),
            )
        })
        .collect();

    let hybrid_candidates = fuse(&candidate_rows, &dense_scores, &sparse_scores, request.top_k, request.dense_weight);
    let documents = aggregate_documents(&hybrid_candidates);

    Ok(RetrievalOutcome { hybrid_candidates, documents })
}

/// Aggregates ranked chunks into per-document summaries (spec §4.6 step 7).
fn aggregate_documents(candidates: &[HybridCandidateChunk]) -> Vec<SourceDocument> {
    let mut by_document: HashMap<&str, SourceDocument> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for candidate in candidates {
        let entry = by_document.entry(candidate.document_id.as_str()).or_insert_with(|| {
            order.push(candidate.document_id.as_str());
            SourceDocument {
                document_id: candidate.document_id.clone(),
                document_name: candidate.document_name.clone(),
                hit_count: 0,
                top_rank: candidate.rank,
                chunk_indices: Vec::new(),
            }
        });
        entry.hit_count += 1;
        entry.top_rank = entry.top_rank.min(candidate.rank);
        entry.chunk_indices.push(candidate.chunk_index);
    }

    let mut documents: Vec<SourceDocument> = order.into_iter().map(|id| by_document.remove(id).unwrap()).collect();
    documents.sort_by_key(|d| d.top_rank);
    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(document_id: &str, rank: i64, chunk_index: i64) -> HybridCandidateChunk {
        HybridCandidateChunk {
            rank,
            source_id: format!("S{rank}"),
            chunk_key: format!("{document_id}:{chunk_index}"),
            document_id: document_id.to_string(),
            document_name: "Doc".to_string(),
            chunk_index,
            context_header: String::new(),
            text: "text".to_string(),
            dense_score: 0.5,
            sparse_score: 0.5,
            hybrid_score: 0.5,
        }
    }

    #[test]
    fn aggregates_by_document_and_sorts_by_top_rank() {
        let candidates = vec![candidate("docB", 1, 0), candidate("docA", 2, 0), candidate("docA", 3, 1)];
        let documents = aggregate_documents(&candidates);
        assert_eq!(documents[0].document_id, "docB");
        assert_eq!(documents[1].document_id, "docA");
        assert_eq!(documents[1].hit_count, 2);
        assert_eq!(documents[1].chunk_indices, vec![0, 1]);
    }
}
