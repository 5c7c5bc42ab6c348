//! RAG Orchestrator chat surface (spec §4.8, §6): stateless/session chat,
//! batch and streamed, plain and reranked.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::http::operation_id_from_headers;
use crate::orchestrator::{ChatParams, ChatService, ChatStreamEvent};
use crate::types::ChatResponse;

#[derive(Clone)]
pub struct RagState {
    pub chat: ChatService,
    pub default_chat_model: String,
    pub default_embedding_model: String,
    pub default_rerank_model: String,
    pub default_history_window: usize,
}

pub fn router(state: RagState) -> Router {
    Router::new()
        .route("/health", get(crate::http::health))
        .route("/v1/rag/chat/stateless", post(chat_stateless_handler))
        .route("/v1/rag/chat/stateless/stream", post(chat_stateless_stream_handler))
        .route("/v1/rag/chat/session/:id", post(chat_session_handler))
        .route("/v1/rag/chat/session/:id/stream", post(chat_session_stream_handler))
        .route("/v1/rag/reranked/chat/stateless", post(reranked_chat_stateless_handler))
        .route("/v1/rag/reranked/chat/stateless/stream", post(reranked_chat_stateless_stream_handler))
        .route("/v1/rag/reranked/chat/session/:id", post(reranked_chat_session_handler))
        .route("/v1/rag/reranked/chat/session/:id/stream", post(reranked_chat_session_stream_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct RagChatRequest {
    project_id: String,
    query: String,
    #[serde(default)]
    document_ids: Vec<String>,
    top_k: Option<usize>,
    dense_top_k: Option<usize>,
    sparse_top_k: Option<usize>,
    dense_weight: Option<f64>,
    embedding_model: Option<String>,
    chat_model: Option<String>,
    rerank_model: Option<String>,
    rerank_candidate_count: Option<usize>,
    history_window: Option<usize>,
}

fn build_params(state: &RagState, req: RagChatRequest, force_rerank: bool) -> ChatParams {
    let top_k = req.top_k.unwrap_or(8);
    ChatParams {
        project_id: req.project_id,
        query: req.query,
        document_ids: req.document_ids,
        top_k,
        dense_top_k: req.dense_top_k.unwrap_or(top_k.max(20)),
        sparse_top_k: req.sparse_top_k.unwrap_or(top_k.max(20)),
        dense_weight: req.dense_weight.unwrap_or(0.5),
        embedding_model: req.embedding_model.unwrap_or_else(|| state.default_embedding_model.clone()),
        chat_model: req.chat_model.unwrap_or_else(|| state.default_chat_model.clone()),
        rerank_model: if force_rerank { Some(req.rerank_model.unwrap_or_else(|| state.default_rerank_model.clone())) } else { None },
        rerank_candidate_count: req.rerank_candidate_count.unwrap_or(top_k.max(20)),
        history_window: req.history_window.unwrap_or(state.default_history_window),
    }
}

async fn chat_stateless_handler(State(state): State<RagState>, headers: HeaderMap, Json(req): Json<RagChatRequest>) -> Result<Json<ChatResponse>> {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, false);
    Ok(Json(state.chat.chat_stateless(&operation_id, params).await?))
}

async fn reranked_chat_stateless_handler(State(state): State<RagState>, headers: HeaderMap, Json(req): Json<RagChatRequest>) -> Result<Json<ChatResponse>> {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, true);
    Ok(Json(state.chat.chat_stateless(&operation_id, params).await?))
}

async fn chat_session_handler(
    State(state): State<RagState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RagChatRequest>,
) -> Result<Json<ChatResponse>> {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, false);
    Ok(Json(state.chat.chat_session(&operation_id, &session_id, params).await?))
}

async fn reranked_chat_session_handler(
    State(state): State<RagState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RagChatRequest>,
) -> Result<Json<ChatResponse>> {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, true);
    Ok(Json(state.chat.chat_session(&operation_id, &session_id, params).await?))
}

/// Renders a `ChatStreamEvent` stream as the `event: <name>\ndata: <json>\n\n`
/// SSE shape (spec §4.8): `meta`, zero or more `delta`, then one terminal
/// `done` or `error`.
fn render_stream(
    mut events: tokio_stream::wrappers::ReceiverStream<ChatStreamEvent>,
) -> tokio_stream::wrappers::ReceiverStream<std::result::Result<Event, std::convert::Infallible>> {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    tokio::spawn(async move {
        while let Some(event) = tokio_stream::StreamExt::next(&mut events).await {
            let sse_event = match event {
                ChatStreamEvent::Meta { mode, session_id, project_id, query, chat_model, embedding_model, rerank_model } => {
                    Event::default().event("meta").data(
                        json!({
                            "mode": mode,
                            "session_id": session_id,
                            "project_id": project_id,
                            "query": query,
                            "chat_model": chat_model,
                            "embedding_model": embedding_model,
                            "rerank_model": rerank_model,
                        })
                        .to_string(),
                    )
                }
                ChatStreamEvent::Delta { content } => Event::default().event("delta").data(json!({ "content": content }).to_string()),
                ChatStreamEvent::Done { response } => Event::default().event("done").data(serde_json::to_string(&response).unwrap_or_default()),
                ChatStreamEvent::Error { message } => Event::default().event("error").data(json!({ "detail": message }).to_string()),
            };
            if tx.send(Ok(sse_event)).await.is_err() {
                return;
            }
        }
    });
    tokio_stream::wrappers::ReceiverStream::new(rx)
}

async fn chat_stateless_stream_handler(State(state): State<RagState>, headers: HeaderMap, Json(req): Json<RagChatRequest>) -> impl IntoResponse {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, false);
    let events = state.chat.stream_chat_stateless(&operation_id, params);
    Sse::new(render_stream(events)).keep_alive(KeepAlive::default())
}

async fn reranked_chat_stateless_stream_handler(State(state): State<RagState>, headers: HeaderMap, Json(req): Json<RagChatRequest>) -> impl IntoResponse {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, true);
    let events = state.chat.stream_chat_stateless(&operation_id, params);
    Sse::new(render_stream(events)).keep_alive(KeepAlive::default())
}

async fn chat_session_stream_handler(
    State(state): State<RagState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RagChatRequest>,
) -> impl IntoResponse {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, false);
    let events = state.chat.stream_chat_session(&operation_id, &session_id, params);
    Sse::new(render_stream(events)).keep_alive(KeepAlive::default())
}

async fn reranked_chat_session_stream_handler(
    State(state): State<RagState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RagChatRequest>,
) -> impl IntoResponse {
    let operation_id = operation_id_from_headers(&headers);
    let params = build_params(&state, req, true);
    let events = state.chat.stream_chat_session(&operation_id, &session_id, params);
    Sse::new(render_stream(events)).keep_alive(KeepAlive::default())
}
