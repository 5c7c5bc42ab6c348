//! Ingestion Service HTTP surface (spec §6): pipeline preview endpoints,
//! project CRUD, and document ingestion.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::clients::ollama_client::OllamaInferenceClient;
use crate::error::{RagError, Result};
use crate::http::operation_id_from_headers;
use crate::ingestion::{Automation, ChunkOptions, IngestRequest, IngestionService, ManualChunk};
use crate::operations::OperationRegistry;
use crate::prompts::PromptStore;
use crate::text::{agentic_chunk, chunk as chunk_mod, contextualize, normalize};
use crate::types::{Chunk, ContextualizationMode, Document, Project};

#[derive(Clone)]
pub struct IngestionState {
    pub service: IngestionService,
    pub inference: OllamaInferenceClient,
    pub prompts: PromptStore,
    pub operations: OperationRegistry,
    pub default_chat_model: String,
}

pub fn router(state: IngestionState) -> Router {
    Router::new()
        .route("/health", get(crate::http::health))
        .route("/v1/pipeline/normalize", post(normalize_handler))
        .route("/v1/pipeline/chunk", post(chunk_handler))
        .route("/v1/pipeline/contextualize", post(contextualize_handler))
        .route("/v1/pipeline/preview-automatic", post(preview_automatic_handler))
        .route("/v1/pipeline/operations/:id/cancel", post(cancel_operation_handler))
        .route("/v1/projects", post(create_project_handler).get(list_projects_handler))
        .route("/v1/projects/:id", get(get_project_handler).delete(delete_project_handler))
        .route("/v1/projects/:id/documents", get(list_documents_handler))
        .route("/v1/projects/documents/:id/chunks", get(list_chunks_handler))
        .route("/v1/projects/:id/documents/ingest", post(ingest_document_handler))
        .with_state(state)
}

// ------------------------------------------------------------- normalize

#[derive(Deserialize)]
struct NormalizeRequest {
    text: String,
    #[serde(default = "default_max_blank_lines")]
    max_blank_lines: usize,
    #[serde(default)]
    remove_repeated_short_lines: bool,
}

fn default_max_blank_lines() -> usize {
    1
}

#[derive(Serialize)]
struct NormalizeResponse {
    normalized_text: String,
    removed_repeated_line_count: usize,
    collapsed_whitespace_count: usize,
}

async fn normalize_handler(Json(req): Json<NormalizeRequest>) -> Json<NormalizeResponse> {
    let result = normalize::normalize(&req.text, req.max_blank_lines, req.remove_repeated_short_lines);
    Json(NormalizeResponse {
        normalized_text: result.normalized_text,
        removed_repeated_line_count: result.removed_repeated_line_count,
        collapsed_whitespace_count: result.collapsed_whitespace_count,
    })
}

// ----------------------------------------------------------------- chunk

#[derive(Deserialize)]
struct ChunkRequest {
    text: String,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    #[serde(default)]
    overlap_chars: usize,
    #[serde(default)]
    agentic: bool,
    model: Option<String>,
}

#[derive(Serialize)]
struct ChunkRow {
    chunk_index: i64,
    start_char: i64,
    end_char: i64,
    text: String,
    rationale: String,
}

impl From<chunk_mod::ChunkCandidate> for ChunkRow {
    fn from(c: chunk_mod::ChunkCandidate) -> Self {
        Self { chunk_index: c.chunk_index, start_char: c.start_char, end_char: c.end_char, text: c.text, rationale: c.rationale }
    }
}

async fn chunk_handler(
    State(state): State<IngestionState>,
    headers: HeaderMap,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<Vec<ChunkRow>>> {
    chunk_mod::validate_chunk_params(req.max_chunk_chars, req.min_chunk_chars, req.overlap_chars)?;
    let operation_id = operation_id_from_headers(&headers);
    let (cancel, _guard) = state.operations.register(&operation_id);

    let candidates = if req.agentic {
        let model = req.model.as_deref().unwrap_or(&state.default_chat_model);
        agentic_chunk::chunk_with_fallback(&state.inference, &state.prompts, &cancel, &req.text, model, req.max_chunk_chars, req.min_chunk_chars).await
    } else {
        chunk_mod::chunk(&req.text, req.max_chunk_chars, req.min_chunk_chars, req.overlap_chars)
    };

    Ok(Json(candidates.into_iter().map(ChunkRow::from).collect()))
}

// ---------------------------------------------------------- contextualize

#[derive(Deserialize)]
struct ChunkInput {
    chunk_index: i64,
    start_char: i64,
    end_char: i64,
    text: String,
    #[serde(default)]
    rationale: String,
}

#[derive(Deserialize)]
struct ContextualizeRequest {
    document_name: String,
    full_document_text: String,
    chunks: Vec<ChunkInput>,
    #[serde(default)]
    mode: ContextualizeModeRequest,
    model: Option<String>,
}

#[derive(Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum ContextualizeModeRequest {
    #[default]
    Template,
    Llm,
}

#[derive(Serialize)]
struct ContextualizedRow {
    chunk_index: i64,
    start_char: i64,
    end_char: i64,
    rationale: String,
    chunk_text: String,
    context_header: String,
    contextualized_text: String,
}

async fn contextualize_handler(
    State(state): State<IngestionState>,
    headers: HeaderMap,
    Json(req): Json<ContextualizeRequest>,
) -> Result<Json<Vec<ContextualizedRow>>> {
    let operation_id = operation_id_from_headers(&headers);
    let (cancel, _guard) = state.operations.register(&operation_id);

    let candidates: Vec<chunk_mod::ChunkCandidate> = req
        .chunks
        .into_iter()
        .map(|c| chunk_mod::ChunkCandidate { chunk_index: c.chunk_index, start_char: c.start_char, end_char: c.end_char, text: c.text, rationale: c.rationale })
        .collect();

    let target = match req.mode {
        ContextualizeModeRequest::Llm => {
            let model = req.model.unwrap_or_else(|| state.default_chat_model.clone());
            contextualize::ContextualizationTarget::Llm { model }
        }
        ContextualizeModeRequest::Template => contextualize::ContextualizationTarget::Template,
    };

    let out = contextualize::contextualize(&state.inference, &state.prompts, &cancel, &req.document_name, &req.full_document_text, &candidates, target).await?;

    Ok(Json(
        out.into_iter()
            .map(|c| ContextualizedRow {
                chunk_index: c.chunk_index,
                start_char: c.start_char,
                end_char: c.end_char,
                rationale: c.rationale,
                chunk_text: c.chunk_text,
                context_header: c.context_header,
                contextualized_text: c.contextualized_text,
            })
            .collect(),
    ))
}

// ------------------------------------------------------- preview-automatic

#[derive(Deserialize)]
struct PreviewAutomaticRequest {
    document_name: String,
    raw_text: String,
    #[serde(default)]
    normalize_text: bool,
    #[serde(default)]
    agentic_chunking: bool,
    #[serde(default)]
    contextual_headers: bool,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    #[serde(default)]
    overlap_chars: usize,
    llm_model: Option<String>,
}

#[derive(Serialize)]
struct PreviewAutomaticResponse {
    normalized_text: String,
    chunks: Vec<ContextualizedRow>,
}

/// Dry run of the automatic pipeline: normalize, chunk, contextualize, but
/// never embeds or persists (spec §6: "dry run of auto pipeline").
async fn preview_automatic_handler(
    State(state): State<IngestionState>,
    headers: HeaderMap,
    Json(req): Json<PreviewAutomaticRequest>,
) -> Result<Json<PreviewAutomaticResponse>> {
    chunk_mod::validate_chunk_params(req.max_chunk_chars, req.min_chunk_chars, req.overlap_chars)?;
    let operation_id = operation_id_from_headers(&headers);
    let (cancel, _guard) = state.operations.register(&operation_id);

    let normalized_text = if req.normalize_text {
        normalize::normalize(&req.raw_text, 1, true).normalized_text
    } else {
        req.raw_text.clone()
    };

    let model = req.llm_model.clone().unwrap_or_else(|| state.default_chat_model.clone());
    let candidates = if req.agentic_chunking {
        agentic_chunk::chunk_with_fallback(&state.inference, &state.prompts, &cancel, &normalized_text, &model, req.max_chunk_chars, req.min_chunk_chars).await
    } else {
        chunk_mod::chunk(&normalized_text, req.max_chunk_chars, req.min_chunk_chars, req.overlap_chars)
    };

    let target = if req.contextual_headers { contextualize::ContextualizationTarget::Llm { model } } else { contextualize::ContextualizationTarget::Template };
    let out = contextualize::contextualize(&state.inference, &state.prompts, &cancel, &req.document_name, &normalized_text, &candidates, target).await?;

    Ok(Json(PreviewAutomaticResponse {
        normalized_text,
        chunks: out
            .into_iter()
            .map(|c| ContextualizedRow {
                chunk_index: c.chunk_index,
                start_char: c.start_char,
                end_char: c.end_char,
                rationale: c.rationale,
                chunk_text: c.chunk_text,
                context_header: c.context_header,
                contextualized_text: c.contextualized_text,
            })
            .collect(),
    }))
}

// ------------------------------------------------------------- operations

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn cancel_operation_handler(State(state): State<IngestionState>, Path(id): Path<String>) -> (axum::http::StatusCode, Json<CancelResponse>) {
    let cancelled = state.operations.cancel(&id);
    let status = if cancelled { axum::http::StatusCode::ACCEPTED } else { axum::http::StatusCode::OK };
    (status, Json(CancelResponse { cancelled }))
}

// --------------------------------------------------------------- projects

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    description: Option<String>,
}

async fn create_project_handler(State(state): State<IngestionState>, Json(req): Json<CreateProjectRequest>) -> Result<Json<Project>> {
    Ok(Json(state.service.create_project(&req.name, req.description)?))
}

async fn list_projects_handler(State(state): State<IngestionState>) -> Result<Json<Vec<Project>>> {
    Ok(Json(state.service.list_projects()?))
}

async fn get_project_handler(State(state): State<IngestionState>, Path(id): Path<String>) -> Result<Json<Project>> {
    Ok(Json(state.service.get_project(&id)?))
}

async fn delete_project_handler(State(state): State<IngestionState>, Path(id): Path<String>) -> Result<axum::http::StatusCode> {
    state.service.delete_project(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn list_documents_handler(State(state): State<IngestionState>, Path(id): Path<String>) -> Result<Json<Vec<Document>>> {
    Ok(Json(state.service.list_documents(&id)?))
}

#[derive(Deserialize)]
struct ListChunksQuery {
    #[serde(default)]
    approved_only: bool,
}

async fn list_chunks_handler(
    State(state): State<IngestionState>,
    Path(id): Path<String>,
    Query(q): Query<ListChunksQuery>,
) -> Result<Json<Vec<Chunk>>> {
    let chunks = state.service.list_chunks(&id)?;
    Ok(Json(if q.approved_only { chunks.into_iter().filter(|c| c.approved).collect() } else { chunks }))
}

// ----------------------------------------------------------------- ingest

#[derive(Deserialize)]
#[serde(tag = "workflow_mode", rename_all = "snake_case")]
enum IngestDocumentRequest {
    Automatic {
        document_name: String,
        #[serde(default = "default_source_type")]
        source_type: String,
        raw_text: String,
        #[serde(default)]
        normalize_text: bool,
        #[serde(default)]
        agentic_chunking: bool,
        #[serde(default)]
        contextual_headers: bool,
        max_chunk_chars: usize,
        min_chunk_chars: usize,
        #[serde(default)]
        overlap_chars: usize,
        llm_model: Option<String>,
        embedding_model: Option<String>,
    },
    Manual {
        document_name: String,
        #[serde(default = "default_source_type")]
        source_type: String,
        raw_text: String,
        normalized_text: String,
        approved_chunks: Vec<ManualChunkInput>,
        embedding_model: Option<String>,
    },
}

fn default_source_type() -> String {
    "text".to_string()
}

#[derive(Deserialize)]
struct ManualChunkInput {
    chunk_index: i64,
    start_char: i64,
    end_char: i64,
    rationale: Option<String>,
    normalized_chunk: String,
    context_header: Option<String>,
    contextualized_chunk: String,
}

impl From<ManualChunkInput> for ManualChunk {
    fn from(c: ManualChunkInput) -> Self {
        Self {
            chunk_index: c.chunk_index,
            start_char: c.start_char,
            end_char: c.end_char,
            rationale: c.rationale,
            normalized_chunk: c.normalized_chunk,
            context_header: c.context_header,
            contextualized_chunk: c.contextualized_chunk,
        }
    }
}

#[derive(Serialize)]
struct IngestResponse {
    project_id: String,
    document_id: String,
    collection_name: String,
    embedded_chunk_count: usize,
    embedding_model: String,
}

async fn ingest_document_handler(
    State(state): State<IngestionState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<IngestDocumentRequest>,
) -> Result<Json<IngestResponse>> {
    let operation_id = operation_id_from_headers(&headers);
    let (cancel, _guard) = state.operations.register(&operation_id);

    let result = match req {
        IngestDocumentRequest::Automatic {
            document_name,
            source_type,
            raw_text,
            normalize_text,
            agentic_chunking,
            contextual_headers,
            max_chunk_chars,
            min_chunk_chars,
            overlap_chars,
            llm_model,
            embedding_model,
        } => {
            chunk_mod::validate_chunk_params(max_chunk_chars, min_chunk_chars, overlap_chars)?;
            let contextualization_mode = if contextual_headers {
                ContextualizationMode::Llm { model: llm_model.clone().unwrap_or_else(|| state.default_chat_model.clone()) }
            } else {
                ContextualizationMode::Disabled
            };
            state
                .service
                .ingest_document(
                    &cancel,
                    &project_id,
                    IngestRequest::Automatic {
                        document_name: &document_name,
                        source_type: &source_type,
                        raw_text: &raw_text,
                        automation: Automation { normalize_text, agentic_chunking, contextual_headers },
                        chunk_options: ChunkOptions { max_chunk_chars, min_chunk_chars, overlap_chars },
                        contextualization_mode,
                        llm_model: llm_model.as_deref(),
                        embedding_model: embedding_model.as_deref(),
                    },
                )
                .await?
        }
        IngestDocumentRequest::Manual { document_name, source_type, raw_text, normalized_text, approved_chunks, embedding_model } => {
            let approved_chunks: Vec<ManualChunk> = approved_chunks.into_iter().map(ManualChunk::from).collect();
            state
                .service
                .ingest_document(
                    &cancel,
                    &project_id,
                    IngestRequest::Manual {
                        document_name: &document_name,
                        source_type: &source_type,
                        raw_text: &raw_text,
                        normalized_text: &normalized_text,
                        approved_chunks: &approved_chunks,
                        embedding_model: embedding_model.as_deref(),
                    },
                )
                .await?
        }
    };

    Ok(Json(IngestResponse {
        project_id: result.project_id,
        document_id: result.document_id,
        collection_name: result.collection_name,
        embedded_chunk_count: result.embedded_chunk_count,
        embedding_model: result.embedding_model,
    }))
}
