//! RAG Orchestrator (spec §4.8): retrieve -> generate pipeline, citation
//! handling, and the stateless/session chat surface, batch and streamed.

pub mod citations;
pub mod context;
pub mod graph;
pub mod retrieval;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::clients::ollama_client::OllamaInferenceClient;
use crate::clients::vector_store::VectorStore;
use crate::clients::RerankerClient;
use crate::error::Result;
use crate::operations::{CancelToken, OperationRegistry};
use crate::prompts::PromptStore;
use crate::session::SessionStore;
use crate::storage::{queries, Storage};
use crate::types::{ChatMessage, ChatMode, ChatResponse, MessageRole, SessionMessage};

const CHECKPOINT_THREAD_PREFIX: &str = "rag";

fn checkpoint_thread_id(project_id: &str, session_id: &str) -> String {
    format!("{CHECKPOINT_THREAD_PREFIX}:{project_id}:{session_id}")
}

/// Request parameters for one chat turn. Owned rather than borrowed so
/// the streaming path can move it into a spawned task.
#[derive(Clone)]
pub struct ChatParams {
    pub project_id: String,
    pub query: String,
    pub document_ids: Vec<String>,
    pub top_k: usize,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
    pub dense_weight: f64,
    pub embedding_model: String,
    pub chat_model: String,
    pub rerank_model: Option<String>,
    pub rerank_candidate_count: usize,
    pub history_window: usize,
}

/// A single event in the `meta -> delta* -> (done | error)` SSE shape
/// (spec §4.8/§5). The HTTP layer renders these as `text/event-stream`
/// frames; kept framework-neutral here so the pipeline stays testable
/// without standing up an axum server.
#[derive(Debug, Clone)]
pub enum ChatStreamEvent {
    Meta {
        mode: ChatMode,
        session_id: Option<String>,
        project_id: String,
        query: String,
        chat_model: String,
        embedding_model: String,
        rerank_model: Option<String>,
    },
    Delta { content: String },
    Done { response: Box<ChatResponse> },
    Error { message: String },
}

#[derive(Clone)]
pub struct ChatService {
    storage: Storage,
    checkpoint_storage: Storage,
    vector_store: Arc<dyn VectorStore>,
    inference: OllamaInferenceClient,
    reranker: Option<RerankerClient>,
    prompts: PromptStore,
    sessions: SessionStore,
    operations: OperationRegistry,
}

fn checkpoint_turn(query: &str, answer: &str) -> Vec<SessionMessage> {
    let now = chrono::Utc::now();
    vec![
        SessionMessage {
            id: format!("ckpt-{}", uuid::Uuid::new_v4()),
            role: MessageRole::User,
            content: query.to_string(),
            created_at: now,
        },
        SessionMessage {
            id: format!("ckpt-{}", uuid::Uuid::new_v4()),
            role: MessageRole::Assistant,
            content: answer.to_string(),
            created_at: now,
        },
    ]
}

impl ChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        checkpoint_storage: Storage,
        vector_store: Arc<dyn VectorStore>,
        inference: OllamaInferenceClient,
        reranker: Option<RerankerClient>,
        prompts: PromptStore,
        sessions: SessionStore,
        operations: OperationRegistry,
    ) -> Self {
        Self { storage, checkpoint_storage, vector_store, inference, reranker, prompts, sessions, operations }
    }

    async fn retrieve(&self, params: &ChatParams, cancel: &CancelToken) -> Result<graph::RetrieveOutput> {
        let output = graph::retrieve_node(
            &self.storage,
            self.vector_store.as_ref(),
            &self.inference,
            self.reranker.as_ref(),
            graph::RetrieveInput {
                project_id: &params.project_id,
                query: &params.query,
                document_ids: &params.document_ids,
                top_k: params.top_k,
                dense_top_k: params.dense_top_k,
                sparse_top_k: params.sparse_top_k,
                dense_weight: params.dense_weight,
                embedding_model: &params.embedding_model,
                rerank_model: params.rerank_model.as_deref(),
                rerank_candidate_count: params.rerank_candidate_count,
            },
        )
        .await?;
        cancel.check()?;
        Ok(output)
    }

    fn finalize_answer(&self, retrieve_output: &graph::RetrieveOutput, raw_answer: &str) -> (String, Vec<String>) {
        let clean_answer = crate::text::contextualize::strip_thinking_sections(raw_answer);
        let available: Vec<String> = retrieve_output.sources.iter().map(|s| s.source_id.clone()).collect();
        let citations_used = citations::extract_citations(&clean_answer, &available);
        let answer = citations::strip_inline_citations(&clean_answer);
        (answer, citations_used)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_response(
        &self,
        mode: ChatMode,
        session_id: Option<String>,
        params: &ChatParams,
        retrieve_output: &graph::RetrieveOutput,
        answer: String,
        citations_used: Vec<String>,
    ) -> ChatResponse {
        ChatResponse {
            mode,
            session_id,
            project_id: params.project_id.clone(),
            query: params.query.clone(),
            answer,
            chat_model: params.chat_model.clone(),
            embedding_model: params.embedding_model.clone(),
            rerank_model: retrieve_output.resolved_rerank_model.clone(),
            hybrid_candidates: retrieve_output.hybrid_candidates.clone(),
            sources: retrieve_output.sources.clone(),
            documents: retrieve_output.documents.clone(),
            citations_used,
            created_at: chrono::Utc::now(),
        }
    }

    /// One-shot chat with no session persistence (spec §4.8 stateless mode).
    pub async fn chat_stateless(&self, operation_id: &str, params: ChatParams) -> Result<ChatResponse> {
        let (cancel, _guard) = self.operations.register(operation_id);
        let retrieve_output = self.retrieve(&params, &cancel).await?;

        let (window, question) = graph::split_history_and_current_question(
            &[ChatMessage { role: MessageRole::User, content: params.query.clone() }],
            params.history_window,
        );
        let messages = graph::build_chat_messages(&self.prompts, &window, &question, &retrieve_output.sources)?;
        let raw_answer = graph::generate_node(&self.inference, &cancel, &params.chat_model, &messages).await?;

        let (answer, citations_used) = self.finalize_answer(&retrieve_output, &raw_answer);
        Ok(self.build_response(ChatMode::Stateless, None, &params, &retrieve_output, answer, citations_used))
    }

    /// Chat within a persisted session: loads the checkpoint thread as
    /// conversational history, runs the pipeline, then persists both the
    /// checkpoint turn and the session snapshot (spec §4.8 session mode).
    pub async fn chat_session(&self, operation_id: &str, session_id: &str, params: ChatParams) -> Result<ChatResponse> {
        let (cancel, _guard) = self.operations.register(operation_id);
        let retrieve_output = self.retrieve(&params, &cancel).await?;

        let thread_id = checkpoint_thread_id(&params.project_id, session_id);
        let mut history: Vec<ChatMessage> = self
            .checkpoint_storage
            .with_connection(|conn| queries::load_checkpoint(conn, &thread_id))?
            .into_iter()
            .map(|m| ChatMessage { role: m.role, content: m.content })
            .collect();
        history.push(ChatMessage { role: MessageRole::User, content: params.query.clone() });

        let (window, question) = graph::split_history_and_current_question(&history, params.history_window);
        let messages = graph::build_chat_messages(&self.prompts, &window, &question, &retrieve_output.sources)?;
        let raw_answer = graph::generate_node(&self.inference, &cancel, &params.chat_model, &messages).await?;

        let (answer, citations_used) = self.finalize_answer(&retrieve_output, &raw_answer);
        let response = self.build_response(
            ChatMode::Session,
            Some(session_id.to_string()),
            &params,
            &retrieve_output,
            answer.clone(),
            citations_used,
        );

        self.checkpoint_storage
            .with_connection(|conn| queries::append_checkpoint_messages(conn, &thread_id, &checkpoint_turn(&params.query, &answer)))?;

        self.sessions.append_turn(
            session_id,
            &params.project_id,
            &params.query,
            &answer,
            params.document_ids.clone(),
            response.clone(),
        )?;

        Ok(response)
    }

    /// Streamed stateless chat: emits `meta`, then `delta*`, then exactly
    /// one terminal `done` or `error` (spec §5: "stream shape invariant").
    pub fn stream_chat_stateless(&self, operation_id: &str, params: ChatParams) -> ReceiverStream<ChatStreamEvent> {
        self.stream_inner(operation_id, None, params)
    }

    /// Streamed session chat: same stream shape, plus checkpoint and
    /// session persistence once the answer completes.
    pub fn stream_chat_session(
        &self,
        operation_id: &str,
        session_id: &str,
        params: ChatParams,
    ) -> ReceiverStream<ChatStreamEvent> {
        self.stream_inner(operation_id, Some(session_id.to_string()), params)
    }

    fn stream_inner(&self, operation_id: &str, session_id: Option<String>, params: ChatParams) -> ReceiverStream<ChatStreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let (cancel, guard) = self.operations.register(operation_id);
        let service = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let result = service.run_streaming(&cancel, session_id, params, &tx).await;
            if let Err(e) = result {
                let _ = tx.send(ChatStreamEvent::Error { message: e.to_string() }).await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_streaming(
        &self,
        cancel: &CancelToken,
        session_id: Option<String>,
        params: ChatParams,
        tx: &mpsc::Sender<ChatStreamEvent>,
    ) -> Result<()> {
        let retrieve_output = self.retrieve(&params, cancel).await?;

        let thread_id = session_id.as_ref().map(|id| checkpoint_thread_id(&params.project_id, id));
        let mut history: Vec<ChatMessage> = Vec::new();
        if let Some(thread_id) = &thread_id {
            history = self
                .checkpoint_storage
                .with_connection(|conn| queries::load_checkpoint(conn, thread_id))?
                .into_iter()
                .map(|m| ChatMessage { role: m.role, content: m.content })
                .collect();
        }
        history.push(ChatMessage { role: MessageRole::User, content: params.query.clone() });

        let meta = ChatStreamEvent::Meta {
            mode: if session_id.is_some() { ChatMode::Session } else { ChatMode::Stateless },
            session_id: session_id.clone(),
            project_id: params.project_id.clone(),
            query: params.query.clone(),
            chat_model: params.chat_model.clone(),
            embedding_model: params.embedding_model.clone(),
            rerank_model: retrieve_output.resolved_rerank_model.clone(),
        };
        if tx.send(meta).await.is_err() {
            return Ok(());
        }

        let (window, question) = graph::split_history_and_current_question(&history, params.history_window);
        let messages = graph::build_chat_messages(&self.prompts, &window, &question, &retrieve_output.sources)?;
        let mut stream = self.inference.chat_stream(&params.chat_model, messages, 0.2, None);

        let mut raw_answer = String::new();
        while let Some(chunk) = tokio_stream::StreamExt::next(&mut stream).await {
            cancel.check()?;
            let chunk = chunk?;
            if !chunk.content_delta.is_empty() {
                raw_answer.push_str(&chunk.content_delta);
                if tx.send(ChatStreamEvent::Delta { content: chunk.content_delta }).await.is_err() {
                    return Ok(());
                }
            }
            if chunk.done {
                break;
            }
        }

        let (answer, citations_used) = self.finalize_answer(&retrieve_output, &raw_answer);
        let response = self.build_response(
            if session_id.is_some() { ChatMode::Session } else { ChatMode::Stateless },
            session_id.clone(),
            &params,
            &retrieve_output,
            answer.clone(),
            citations_used,
        );

        if let Some(session_id) = &session_id {
            let thread_id = thread_id.expect("thread_id set whenever session_id is set");
            self.checkpoint_storage
                .with_connection(|conn| queries::append_checkpoint_messages(conn, &thread_id, &checkpoint_turn(&params.query, &answer)))?;

            self.sessions.append_turn(
                session_id,
                &params.project_id,
                &params.query,
                &answer,
                params.document_ids.clone(),
                response.clone(),
            )?;
        }

        let _ = tx.send(ChatStreamEvent::Done { response: Box::new(response) }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_thread_id_is_namespaced() {
        assert_eq!(checkpoint_thread_id("proj-1", "sess-1"), "rag:proj-1:sess-1");
    }
}
