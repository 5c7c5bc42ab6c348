//! Inference Gateway HTTP surface (spec §6): OpenAI-compatible
//! chat/completions/embeddings plus a direct-to-runtime `/rerank` route.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::clients::ollama_client::{ChatMessage as WireChatMessage, OllamaInferenceClient};
use crate::error::Result;
use crate::operations::OperationRegistry;

#[derive(Clone)]
pub struct InferenceState {
    pub inference: OllamaInferenceClient,
    pub operations: OperationRegistry,
    pub default_chat_model: String,
    pub default_embedding_model: String,
}

pub fn router(state: InferenceState) -> Router {
    Router::new()
        .route("/health", get(crate::http::health))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/v1/completions", post(completions_handler))
        .route("/v1/embeddings", post(embeddings_handler))
        .route("/v1/rerank", post(rerank_handler))
        .with_state(state)
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    #[serde(default = "default_temperature")]
    temperature: f32,
    max_tokens: Option<i64>,
    #[serde(default)]
    stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

async fn chat_completions_handler(
    State(state): State<InferenceState>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<axum::response::Response> {
    let messages: Vec<WireChatMessage> = req.messages.into_iter().map(|m| WireChatMessage { role: m.role, content: m.content }).collect();

    if req.stream {
        let mut raw = state.inference.chat_stream(&req.model, messages, req.temperature, req.max_tokens);
        let model = req.model.clone();
        let (tx, rx) = mpsc::channel::<std::result::Result<Event, std::convert::Infallible>>(32);

        tokio::spawn(async move {
            let role_chunk = json!({
                "object": "chat.completion.chunk",
                "model": model,
                "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}],
            });
            if tx.send(Ok(Event::default().data(role_chunk.to_string()))).await.is_err() {
                return;
            }

            while let Some(chunk) = tokio_stream::StreamExt::next(&mut raw).await {
                match chunk {
                    Ok(chunk) => {
                        if !chunk.content_delta.is_empty() {
                            let payload = json!({
                                "object": "chat.completion.chunk",
                                "model": model,
                                "choices": [{"index": 0, "delta": {"content": chunk.content_delta}, "finish_reason": null}],
                            });
                            if tx.send(Ok(Event::default().data(payload.to_string()))).await.is_err() {
                                return;
                            }
                        }
                        if chunk.done {
                            let payload = json!({
                                "object": "chat.completion.chunk",
                                "model": model,
                                "choices": [{"index": 0, "delta": {}, "finish_reason": chunk.finish_reason.unwrap_or_else(|| "stop".to_string())}],
                            });
                            let _ = tx.send(Ok(Event::default().data(payload.to_string()))).await;
                            let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Ok(Event::default().data(json!({"error": e.to_string()}).to_string()))).await;
                        return;
                    }
                }
            }
        });

        let event_stream = ReceiverStream::new(rx);
        return Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()).into_response());
    }

    let (cancel, _guard) = state.operations.register(&uuid::Uuid::new_v4().to_string());
    let completion = state.inference.chat(&req.model, &messages, req.temperature, req.max_tokens, &cancel).await?;

    Ok(Json(json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion",
        "model": req.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": completion.content},
            "finish_reason": completion.finish_reason,
        }],
        "usage": {
            "prompt_tokens": completion.prompt_tokens,
            "completion_tokens": completion.completion_tokens,
            "total_tokens": completion.prompt_tokens + completion.completion_tokens,
        },
    }))
    .into_response())
}

#[derive(Deserialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    max_tokens: Option<i64>,
}

async fn completions_handler(State(state): State<InferenceState>, Json(req): Json<CompletionRequest>) -> Result<Json<serde_json::Value>> {
    let messages = vec![WireChatMessage { role: "user".to_string(), content: req.prompt }];
    let (cancel, _guard) = state.operations.register(&uuid::Uuid::new_v4().to_string());
    let completion = state.inference.chat(&req.model, &messages, req.temperature, req.max_tokens, &cancel).await?;

    Ok(Json(json!({
        "id": format!("cmpl-{}", uuid::Uuid::new_v4()),
        "object": "text_completion",
        "model": req.model,
        "choices": [{"index": 0, "text": completion.content, "finish_reason": completion.finish_reason}],
        "usage": {
            "prompt_tokens": completion.prompt_tokens,
            "completion_tokens": completion.completion_tokens,
            "total_tokens": completion.prompt_tokens + completion.completion_tokens,
        },
    })))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingInput {
    One(String),
    Many(Vec<String>),
}

impl EmbeddingInput {
    fn into_vec(self) -> Vec<String> {
        match self {
            EmbeddingInput::One(s) => vec![s],
            EmbeddingInput::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingsRequest {
    model: String,
    input: EmbeddingInput,
}

async fn embeddings_handler(State(state): State<InferenceState>, Json(req): Json<EmbeddingsRequest>) -> Result<Json<serde_json::Value>> {
    let texts = req.input.into_vec();
    let result = state.inference.embed(&req.model, &texts).await?;

    let data: Vec<serde_json::Value> = result
        .embeddings
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| json!({"object": "embedding", "index": index, "embedding": embedding}))
        .collect();

    Ok(Json(json!({
        "object": "list",
        "model": req.model,
        "data": data,
        "usage": {"prompt_tokens": result.prompt_tokens, "total_tokens": result.prompt_tokens},
    })))
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

async fn rerank_handler(State(state): State<InferenceState>, Json(req): Json<RerankRequest>) -> Result<Json<serde_json::Value>> {
    let result = state.inference.rerank(&req.model, &req.query, &req.documents, req.top_n).await?;
    Ok(Json(json!({
        "model": req.model,
        "results": result.results.into_iter().map(|r| RerankResultRow { index: r.index, relevance_score: r.relevance_score }).collect::<Vec<_>>(),
    })))
}

