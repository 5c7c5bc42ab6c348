//! Ingestion Service (spec §4.9): project CRUD and the automatic/manual
//! document ingestion workflow. Grounded in `ingestion_service.py`.

use uuid::Uuid;

use crate::clients::ollama_client::OllamaInferenceClient;
use crate::clients::vector_store::VectorStore;
use crate::error::{RagError, Result};
use crate::operations::CancelToken;
use crate::prompts::PromptStore;
use crate::storage::{queries, Storage};
use crate::text::{agentic_chunk, chunk, contextualize, normalize};
use crate::types::{
    ChunkingMode, ContextualizationMode, Document, Project, VectorPointPayload, WorkflowMode,
};

/// Derives the project's vector-store collection name from its display
/// name: `"{prefix}_{name.lower().replace(' ', '_')}"`.
pub fn derive_collection_name(prefix: &str, project_name: &str) -> String {
    format!("{prefix}_{}", project_name.to_lowercase().replace(' ', "_"))
}

pub struct ChunkOptions {
    pub max_chunk_chars: usize,
    pub min_chunk_chars: usize,
    pub overlap_chars: usize,
}

pub struct Automation {
    pub normalize_text: bool,
    pub agentic_chunking: bool,
    pub contextual_headers: bool,
}

pub enum IngestRequest<'a> {
    Automatic {
        document_name: &'a str,
        source_type: &'a str,
        raw_text: &'a str,
        automation: Automation,
        chunk_options: ChunkOptions,
        contextualization_mode: ContextualizationMode,
        llm_model: Option<&'a str>,
        embedding_model: Option<&'a str>,
    },
    Manual {
        document_name: &'a str,
        source_type: &'a str,
        raw_text: &'a str,
        normalized_text: &'a str,
        approved_chunks: &'a [ManualChunk],
        embedding_model: Option<&'a str>,
    },
}

pub struct ManualChunk {
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub rationale: Option<String>,
    pub normalized_chunk: String,
    pub context_header: Option<String>,
    pub contextualized_chunk: String,
}

pub struct IngestedDocument {
    pub project_id: String,
    pub document_id: String,
    pub collection_name: String,
    pub embedded_chunk_count: usize,
    pub embedding_model: String,
    pub chunking_mode: ChunkingMode,
    pub contextualization_mode: ContextualizationMode,
}

struct StagedChunk {
    chunk_index: i64,
    start_char: i64,
    end_char: i64,
    rationale: Option<String>,
    normalized_chunk: String,
    context_header: Option<String>,
    contextualized_chunk: String,
}

#[derive(Clone)]
pub struct IngestionService {
    storage: Storage,
    vector_store: std::sync::Arc<dyn VectorStore>,
    inference: OllamaInferenceClient,
    prompts: PromptStore,
    collection_prefix: String,
    default_chat_model: String,
    default_embedding_model: String,
}

impl IngestionService {
    pub fn new(
        storage: Storage,
        vector_store: std::sync::Arc<dyn VectorStore>,
        inference: OllamaInferenceClient,
        prompts: PromptStore,
        collection_prefix: String,
        default_chat_model: String,
        default_embedding_model: String,
    ) -> Self {
        Self { storage, vector_store, inference, prompts, collection_prefix, default_chat_model, default_embedding_model }
    }

    pub fn create_project(&self, name: &str, description: Option<String>) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
            collection_name: derive_collection_name(&self.collection_prefix, name),
            created_at: chrono::Utc::now(),
        };
        self.storage.with_connection(|conn| queries::insert_project(conn, &project))?;
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Project> {
        self.storage.with_connection(|conn| queries::require_project(conn, id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.storage.with_connection(|conn| queries::list_projects(conn))
    }

    /// Deletes the project's SQL rows (cascading to documents/chunks via
    /// schema foreign keys) and its vector-store collection.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        let project = self.get_project(id)?;
        self.vector_store.delete_collection(&project.collection_name).await?;
        let deleted = self.storage.with_connection(|conn| queries::delete_project(conn, id))?;
        if !deleted {
            return Err(RagError::NotFound(format!("project {id}")));
        }
        Ok(())
    }

    pub fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        self.storage.with_connection(|conn| queries::list_documents_for_project(conn, project_id))
    }

    pub fn list_chunks(&self, document_id: &str) -> Result<Vec<crate::types::Chunk>> {
        self.storage.with_connection(|conn| queries::list_chunks_for_document(conn, document_id))
    }

    async fn chunk_runtime(
        &self,
        cancel: &CancelToken,
        text: &str,
        agentic: bool,
        options: &ChunkOptions,
        llm_model: &str,
    ) -> Result<Vec<chunk::ChunkCandidate>> {
        chunk::validate_chunk_params(options.max_chunk_chars, options.min_chunk_chars, options.overlap_chars)?;
        if agentic {
            Ok(agentic_chunk::chunk_with_fallback(
                &self.inference,
                &self.prompts,
                cancel,
                text,
                llm_model,
                options.max_chunk_chars,
                options.min_chunk_chars,
            )
            .await)
        } else {
            Ok(chunk::chunk(text, options.max_chunk_chars, options.min_chunk_chars, options.overlap_chars))
        }
    }

    /// Best-effort raw-text snapshot for a chunk's lineage view.
    /// Grounded in `ingestion_service.py::_extract_raw_chunk_snapshot`.
    fn extract_raw_chunk_snapshot(raw_text: &str, normalized_text: &str, start: i64, end: i64, fallback: &str) -> String {
        if start < 0 || end <= start {
            return fallback.to_string();
        }
        let (start, end) = (start as usize, end as usize);

        if end <= raw_text.chars().count() {
            let slice: String = raw_text.chars().skip(start).take(end - start).collect();
            if !slice.trim().is_empty() {
                return slice;
            }
        }

        if raw_text == normalized_text && start < raw_text.chars().count() {
            let capped_end = end.min(raw_text.chars().count());
            return raw_text.chars().skip(start).take(capped_end - start).collect();
        }

        fallback.to_string()
    }

    /// Runs the full ingestion workflow: normalize/chunk/contextualize (or
    /// take manual inputs as-is), embed, upsert vectors, then persist the
    /// document and chunk rows. Vector upsert happens before the SQL
    /// commit (spec §4.9: "SQL commit follows successful vector upsert").
    pub async fn ingest_document(&self, cancel: &CancelToken, project_id: &str, request: IngestRequest<'_>) -> Result<IngestedDocument> {
        let project = self.get_project(project_id)?;

        let (raw_text, normalized_text, workflow_mode, chunking_mode, contextualization_mode, staged_chunks, embedding_model, source_type, document_name) =
            match request {
                IngestRequest::Automatic {
                    document_name,
                    source_type,
                    raw_text,
                    automation,
                    chunk_options,
                    contextualization_mode,
                    llm_model,
                    embedding_model,
                } => {
                    let normalized_text = if automation.normalize_text {
                        normalize::normalize(raw_text, 1, true).normalized_text
                    } else {
                        raw_text.to_string()
                    };

                    let model_name = llm_model.unwrap_or(&self.default_chat_model);
                    let chunks = self
                        .chunk_runtime(cancel, &normalized_text, automation.agentic_chunking, &chunk_options, model_name)
                        .await?;
                    let chunking_mode = if automation.agentic_chunking {
                        ChunkingMode::Agentic { model: model_name.to_string() }
                    } else {
                        ChunkingMode::Deterministic
                    };

                    let (contextualized, contextualization_mode) = if automation.contextual_headers {
                        let target = match &contextualization_mode {
                            ContextualizationMode::Llm { model } => contextualize::ContextualizationTarget::Llm { model: model.clone() },
                            _ => contextualize::ContextualizationTarget::Template,
                        };
                        let out = contextualize::contextualize(&self.inference, &self.prompts, cancel, document_name, &normalized_text, &chunks, target).await?;
                        (out, contextualization_mode)
                    } else {
                        let out = chunks
                            .iter()
                            .map(|c| contextualize::ContextualizedChunk {
                                chunk_index: c.chunk_index,
                                start_char: c.start_char,
                                end_char: c.end_char,
                                rationale: c.rationale.clone(),
                                chunk_text: c.text.clone(),
                                context_header: String::new(),
                                contextualized_text: c.text.clone(),
                            })
                            .collect();
                        (out, ContextualizationMode::Disabled)
                    };

                    let staged: Vec<StagedChunk> = contextualized
                        .into_iter()
                        .map(|c| StagedChunk {
                            chunk_index: c.chunk_index,
                            start_char: c.start_char,
                            end_char: c.end_char,
                            rationale: Some(c.rationale),
                            normalized_chunk: c.chunk_text,
                            context_header: if c.context_header.is_empty() { None } else { Some(c.context_header) },
                            contextualized_chunk: c.contextualized_text,
                        })
                        .collect();

                    (
                        raw_text.to_string(),
                        normalized_text,
                        WorkflowMode::Automatic,
                        chunking_mode,
                        contextualization_mode,
                        staged,
                        embedding_model.map(str::to_string),
                        source_type.to_string(),
                        document_name.to_string(),
                    )
                }
                IngestRequest::Manual { document_name, source_type, raw_text, normalized_text, approved_chunks, embedding_model } => {
                    if approved_chunks.is_empty() {
                        return Err(RagError::Validation("approved_chunks is required when workflow_mode is 'manual'".into()));
                    }
                    let staged = approved_chunks
                        .iter()
                        .map(|c| StagedChunk {
                            chunk_index: c.chunk_index,
                            start_char: c.start_char,
                            end_char: c.end_char,
                            rationale: c.rationale.clone(),
                            normalized_chunk: c.normalized_chunk.clone(),
                            context_header: c.context_header.clone(),
                            contextualized_chunk: c.contextualized_chunk.clone(),
                        })
                        .collect();

                    (
                        raw_text.to_string(),
                        normalized_text.to_string(),
                        WorkflowMode::Manual,
                        ChunkingMode::Manual,
                        ContextualizationMode::Manual,
                        staged,
                        embedding_model.map(str::to_string),
                        source_type.to_string(),
                        document_name.to_string(),
                    )
                }
            };

        if staged_chunks.is_empty() {
            return Err(RagError::Validation("No chunks available for embedding".into()));
        }

        let embedding_model = embedding_model.unwrap_or_else(|| self.default_embedding_model.clone());
        cancel.check()?;
        let texts: Vec<String> = staged_chunks.iter().map(|c| c.contextualized_chunk.clone()).collect();
        let embeddings = self.inference.embed(&embedding_model, &texts).await?;
        let vector_size = embeddings
            .embeddings
            .first()
            .ok_or_else(|| RagError::ExternalService("embedding response contained no vectors".into()))?
            .len();

        self.vector_store.ensure_collection(&project.collection_name, vector_size).await?;

        let document = Document {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            name: document_name,
            source_type: source_type.clone(),
            raw_text: raw_text.clone(),
            normalized_text: normalized_text.clone(),
            workflow_mode,
            chunking_mode,
            contextualization_mode,
            normalization_version: 1,
            chunking_version: 1,
            contextualization_version: 1,
            embedding_model: embedding_model.clone(),
            created_at: chrono::Utc::now(),
        };

        let mut points = Vec::with_capacity(staged_chunks.len());
        let mut chunk_rows = Vec::with_capacity(staged_chunks.len());

        for (staged, vector) in staged_chunks.into_iter().zip(embeddings.embeddings.into_iter()) {
            let point_id = Uuid::new_v4().to_string();
            let raw_chunk = Self::extract_raw_chunk_snapshot(&raw_text, &normalized_text, staged.start_char, staged.end_char, &staged.normalized_chunk);

            let payload = VectorPointPayload {
                project_id: project.id.clone(),
                document_id: document.id.clone(),
                document_name: document.name.clone(),
                chunk_id: format!("{}:{}", document.id, staged.chunk_index),
                chunk_index: staged.chunk_index,
                start_char: staged.start_char,
                end_char: staged.end_char,
                source_type: source_type.clone(),
                indexed_at: chrono::Utc::now(),
            };

            points.push((point_id.clone(), vector, payload.clone()));

            chunk_rows.push(crate::types::Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                chunk_index: staged.chunk_index,
                start_char: staged.start_char,
                end_char: staged.end_char,
                rationale: staged.rationale,
                raw_chunk,
                normalized_chunk: staged.normalized_chunk,
                context_header: staged.context_header,
                contextualized_chunk: staged.contextualized_chunk,
                approved: true,
                point_id,
                metadata: serde_json::to_value(&payload).unwrap_or(serde_json::json!({})),
            });
        }

        self.vector_store.upsert_chunks(&project.collection_name, points).await?;

        self.storage.with_transaction(|tx| {
            queries::insert_document(tx, &document)?;
            for chunk_row in &chunk_rows {
                queries::insert_chunk(tx, chunk_row)?;
            }
            Ok(())
        })?;

        Ok(IngestedDocument {
            project_id: project.id,
            document_id: document.id,
            collection_name: project.collection_name,
            embedded_chunk_count: chunk_rows.len(),
            embedding_model,
            chunking_mode: document.chunking_mode,
            contextualization_mode: document.contextualization_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_collection_name_from_display_name() {
        assert_eq!(derive_collection_name("rag", "My Project"), "rag_my_project");
    }

    #[test]
    fn raw_chunk_snapshot_falls_back_when_slice_is_blank() {
        let snapshot = IngestionService::extract_raw_chunk_snapshot("abc", "xyz", 0, 3, "fallback");
        assert_eq!(snapshot, "abc");
    }

    #[test]
    fn raw_chunk_snapshot_uses_fallback_on_invalid_offsets() {
        let snapshot = IngestionService::extract_raw_chunk_snapshot("abc", "abc", 5, 2, "fallback");
        assert_eq!(snapshot, "fallback");
    }
}
