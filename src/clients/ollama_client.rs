//! Adapter for the local LLM runtime's Ollama-compatible `/api/*` wire
//! contracts: chat (batch + streamed), embeddings, rerank.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{RagError, Result};
use crate::operations::CancelToken;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatGenerationResult {
    pub content: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub finish_reason: String,
}

/// One normalized delta from a streamed chat completion. `thinking` and
/// `content` deltas are both folded into `content_delta`, thinking
/// wrapped verbatim in `<thinking>...</thinking>` (Design Notes §9).
#[derive(Debug, Clone, Default)]
pub struct ChatStreamChunk {
    pub content_delta: String,
    pub done: bool,
    pub finish_reason: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

pub struct EmbeddingGenerationResult {
    pub embeddings: Vec<Vec<f32>>,
    pub prompt_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct RerankResultRow {
    pub index: usize,
    pub relevance_score: f64,
}

pub struct RerankGenerationResult {
    pub results: Vec<RerankResultRow>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i64>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [ChatMessage],
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatApiMessage {
    content: Option<String>,
    thinking: Option<String>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    message: Option<ChatApiMessage>,
    #[serde(default)]
    prompt_eval_count: i64,
    #[serde(default)]
    eval_count: i64,
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct EmbedApiResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: i64,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
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
    results: Vec<RerankApiResultRow>,
}

/// Client for `POST /api/chat`, `/api/embed`, `/api/rerank` on the local
/// runtime. One shared instance per process with pooled connections
/// (spec §5: "a single shared client per process with pooled
/// connections; no request mutates another").
#[derive(Clone)]
pub struct OllamaInferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaInferenceClient {
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

    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<i64>,
        cancel: &CancelToken,
    ) -> Result<ChatGenerationResult> {
        let body = ChatRequest {
            model,
            stream: false,
            messages,
            options: ChatOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = cancel
            .race(async {
                self.http
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| RagError::external("OllamaChatError", e, &url))
            })
            .await?;

        let response = response
            .error_for_status()
            .map_err(|e| RagError::external("OllamaChatError", e, &url))?;
        let parsed: ChatApiResponse = response
            .json()
            .await
            .map_err(|e| RagError::external("OllamaChatError", e, "malformed response body"))?;

        let message = parsed
            .message
            .ok_or_else(|| RagError::ExternalService("Ollama response is missing message payload".into()))?;

        let thinking = message.thinking.unwrap_or_default();
        let mut content = message.content.unwrap_or_default();
        content = content.trim().to_string();

        let final_content = if !thinking.is_empty() && !content.is_empty() {
            format!("<thinking>{thinking}</thinking>\n{content}")
        } else if !thinking.is_empty() {
            format!("<thinking>{thinking}</thinking>")
        } else {
            content
        };

        if final_content.is_empty() {
            return Err(RagError::ExternalService(
                "Ollama response contained empty completion text".into(),
            ));
        }

        Ok(ChatGenerationResult {
            content: final_content,
            prompt_tokens: parsed.prompt_eval_count.max(0),
            completion_tokens: parsed.eval_count.max(0),
            finish_reason: parsed.done_reason.filter(|s| !s.is_empty()).unwrap_or_else(|| "stop".into()),
        })
    }

    /// Streams NDJSON chat deltas, emitting one `ChatStreamChunk` per
    /// parsed upstream line with non-empty content or a terminal `done`.
    pub fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<i64>,
    ) -> ReceiverStream<Result<ChatStreamChunk>> {
        let (tx, rx) = mpsc::channel(32);
        let http = self.http.clone();
        let url = format!("{}/api/chat", self.base_url);
        let model = model.to_string();

        tokio::spawn(async move {
            let body = ChatRequest {
                model: &model,
                stream: true,
                messages: &messages,
                options: ChatOptions {
                    temperature,
                    num_predict: max_tokens,
                },
            };

            let response = match http.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(RagError::external("OllamaChatStreamError", e, &url))).await;
                    return;
                }
            };

            let response = match response.error_for_status() {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(RagError::external("OllamaChatStreamError", e, &url))).await;
                    return;
                }
            };

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(next) = stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(RagError::external("OllamaChatStreamError", e, &url)))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    let chunk = parse_chat_stream_line(&line);
                    match chunk {
                        Ok(chunk) => {
                            let should_emit = !chunk.content_delta.is_empty() || chunk.done;
                            if should_emit && tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }

    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<EmbeddingGenerationResult> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest { model, input: texts };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::external("OllamaEmbedError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("OllamaEmbedError", e, &url))?;

        let parsed: EmbedApiResponse = response
            .json()
            .await
            .map_err(|e| RagError::external("OllamaEmbedError", e, "malformed response body"))?;

        if parsed.embeddings.iter().any(|v| v.is_empty()) {
            return Err(RagError::ExternalService(
                "Ollama embeddings response contained an empty vector".into(),
            ));
        }

        Ok(EmbeddingGenerationResult {
            embeddings: parsed.embeddings,
            prompt_tokens: parsed.prompt_eval_count.max(0),
        })
    }

    pub async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> Result<RerankGenerationResult> {
        let url = format!("{}/api/rerank", self.base_url);
        let body = RerankRequest { model, query, documents, top_n };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::external("OllamaRerankError", e, &url))?
            .error_for_status()
            .map_err(|e| RagError::external("OllamaRerankError", e, &url))?;

        let parsed: RerankApiResponse = response
            .json()
            .await
            .map_err(|e| RagError::external("OllamaRerankError", e, "malformed response body"))?;

        Ok(RerankGenerationResult {
            results: parsed
                .results
                .into_iter()
                .map(|r| RerankResultRow { index: r.index, relevance_score: r.relevance_score })
                .collect(),
        })
    }
}

fn parse_chat_stream_line(line: &str) -> Result<ChatStreamChunk> {
    let parsed: serde_json::Value = serde_json::from_str(line)
        .map_err(|_| RagError::ExternalService("Ollama chat stream returned malformed JSON payload".into()))?;

    let done = parsed.get("done").and_then(|v| v.as_bool()).unwrap_or(false);

    let mut content_delta = String::new();
    if let Some(message) = parsed.get("message") {
        if let Some(thinking) = message.get("thinking").and_then(|v| v.as_str()) {
            if !thinking.is_empty() {
                content_delta.push_str(&format!("<thinking>{thinking}</thinking>"));
            }
        }
        if let Some(content) = message.get("content").and_then(|v| v.as_str()) {
            content_delta.push_str(content);
        }
    }

    let finish_reason = parsed
        .get("done_reason")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    let prompt_tokens = parsed.get("prompt_eval_count").and_then(|v| v.as_i64());
    let completion_tokens = parsed.get("eval_count").and_then(|v| v.as_i64());

    Ok(ChatStreamChunk {
        content_delta,
        done,
        finish_reason,
        prompt_tokens,
        completion_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_and_thinking_deltas() {
        let line = r#"{"message":{"thinking":"reasoning","content":"answer"},"done":false}"#;
        let chunk = parse_chat_stream_line(line).unwrap();
        assert_eq!(chunk.content_delta, "<thinking>reasoning</thinking>answer");
        assert!(!chunk.done);
    }

    #[test]
    fn parses_terminal_line() {
        let line = r#"{"done":true,"done_reason":"stop","prompt_eval_count":10,"eval_count":5}"#;
        let chunk = parse_chat_stream_line(line).unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
        assert_eq!(chunk.prompt_tokens, Some(10));
        assert_eq!(chunk.completion_tokens, Some(5));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_chat_stream_line("not json").is_err());
    }
}
