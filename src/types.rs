//! Core domain types shared across all four services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named collection of documents, backed by one vector-store collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Vector-store collection name: `"{prefix}_{name.lower().replace(' ', '_')}"`.
    pub collection_name: String,
    pub created_at: DateTime<Utc>,
}

/// How a document reached its current chunk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    Automatic,
    Manual,
}

/// Replaces runtime string modes with a sum type (Design Notes: dynamic
/// dispatch over chunker/contextualizer modes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChunkingMode {
    Deterministic,
    Agentic { model: String },
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContextualizationMode {
    Llm { model: String },
    Template,
    Manual,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub source_type: String,
    pub raw_text: String,
    pub normalized_text: String,
    pub workflow_mode: WorkflowMode,
    pub chunking_mode: ChunkingMode,
    pub contextualization_mode: ContextualizationMode,
    pub normalization_version: i32,
    pub chunking_version: i32,
    pub contextualization_version: i32,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

/// A contiguous retrieval unit of a document.
///
/// Invariant: `0 <= start_char < end_char`, chunk indices are contiguous
/// from 0 per document, `contextualized_chunk` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub rationale: Option<String>,
    pub raw_chunk: String,
    pub normalized_chunk: String,
    pub context_header: Option<String>,
    pub contextualized_chunk: String,
    pub approved: bool,
    /// Vector-store point id, also the SQL reference used by downstream code.
    pub point_id: String,
    pub metadata: serde_json::Value,
}

impl Chunk {
    /// Stable key used across retrieval: `"{document_id}:{chunk_index}"`.
    pub fn chunk_key(&self) -> String {
        format!("{}:{}", self.document_id, self.chunk_index)
    }

    /// `contextualized_chunk == context_header + "\n\n" + normalized_chunk`
    /// when a header is present, else equals `normalized_chunk`.
    pub fn expected_contextualized(&self) -> String {
        match &self.context_header {
            Some(h) if !h.is_empty() => format!("{h}\n\n{}", self.normalized_chunk),
            _ => self.normalized_chunk.clone(),
        }
    }
}

/// Payload carried alongside a vector embedding in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPointPayload {
    pub project_id: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_id: String,
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub source_type: String,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A bare role/content pair: the shape incoming stateless-chat history
/// arrives in over the wire, before any persistence timestamps exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

pub const DEFAULT_SESSION_TITLE: &str = "Untitled Session";

/// Chunk row in pre-rerank hybrid order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridCandidateChunk {
    pub rank: i64,
    pub source_id: String,
    pub chunk_key: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: i64,
    pub context_header: String,
    pub text: String,
    pub dense_score: f64,
    pub sparse_score: f64,
    pub hybrid_score: f64,
}

/// Chunk row in final order, after an optional rerank pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChunk {
    pub rank: i64,
    pub source_id: String,
    pub chunk_key: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: i64,
    pub context_header: String,
    pub text: String,
    pub dense_score: f64,
    pub sparse_score: f64,
    pub hybrid_score: f64,
    pub original_rank: i64,
    pub rerank_score: f64,
}

/// Document-level aggregation of ranked sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub document_name: String,
    pub hit_count: usize,
    pub top_rank: i64,
    pub chunk_indices: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Stateless,
    Session,
}

/// Full RAG chat response envelope, snapshot-persisted on sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub mode: ChatMode,
    pub session_id: Option<String>,
    pub project_id: String,
    pub query: String,
    pub answer: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub rerank_model: Option<String>,
    pub hybrid_candidates: Vec<HybridCandidateChunk>,
    pub sources: Vec<SourceChunk>,
    pub documents: Vec<SourceDocument>,
    pub citations_used: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub selected_document_ids: Vec<String>,
    pub selected_source_id: Option<String>,
    pub latest_response: Option<ChatResponse>,
    pub messages: Vec<SessionMessage>,
}
