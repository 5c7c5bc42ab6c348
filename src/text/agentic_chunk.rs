//! LLM-driven chunk boundary proposer. Falls back to the deterministic
//! chunker on any validation or upstream failure (spec §4.3).

use crate::clients::ollama_client::{ChatMessage, OllamaInferenceClient};
use crate::error::{RagError, Result};
use crate::operations::CancelToken;
use crate::prompts::PromptStore;
use crate::text::chunk::{self, ChunkCandidate};

pub const AGENTIC_RATIONALE: &str = "Agentic boundary selection";
pub const FALLBACK_RATIONALE_PREFIX: &str = "Fallback to deterministic chunking";

#[derive(serde::Deserialize)]
struct AgenticChunkEntry {
    text: Option<String>,
    rationale: Option<String>,
}

#[derive(serde::Deserialize)]
struct AgenticChunkPayload {
    chunks: Option<Vec<serde_json::Value>>,
}

/// Attempts agentic chunking; on any failure, falls back to the
/// deterministic chunker with every rationale prefixed to record the
/// fallback.
pub async fn chunk_with_fallback(
    client: &OllamaInferenceClient,
    prompts: &PromptStore,
    cancel: &CancelToken,
    text: &str,
    model: &str,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
) -> Vec<ChunkCandidate> {
    match try_agentic_chunk(client, prompts, cancel, text, model, max_chunk_chars, min_chunk_chars).await {
        Ok(chunks) if !chunks.is_empty() => chunks,
        _ => chunk::chunk(text, max_chunk_chars, min_chunk_chars, 0)
            .into_iter()
            .map(|mut c| {
                c.rationale = format!("{FALLBACK_RATIONALE_PREFIX}: {}", c.rationale);
                c
            })
            .collect(),
    }
}

async fn try_agentic_chunk(
    client: &OllamaInferenceClient,
    prompts: &PromptStore,
    cancel: &CancelToken,
    text: &str,
    model: &str,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
) -> Result<Vec<ChunkCandidate>> {
    cancel.check()?;

    let system_prompt = prompts.get("agentic_chunk_selector.md")?;
    let user_prompt = format!(
        "Return JSON with this schema: {{\"chunks\":[{{\"text\":\"...\",\"rationale\":\"...\"}}]}}. \
         Constraints: max_chunk_chars={max_chunk_chars}, min_chunk_chars={min_chunk_chars}.\n\nTEXT:\n{text}"
    );

    let messages = vec![
        ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
        ChatMessage { role: "user".to_string(), content: user_prompt },
    ];

    let completion = client.chat(model, &messages, 0.0, None, cancel).await?;
    let payload: AgenticChunkPayload = serde_json::from_str(&completion.content)
        .map_err(|_| RagError::Validation("Agentic chunking returned non-JSON response".into()))?;

    let raw_chunks = payload
        .chunks
        .filter(|c| !c.is_empty())
        .ok_or_else(|| RagError::Validation("Agentic chunking did not return any chunks".into()))?;

    let text_chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::with_capacity(raw_chunks.len());
    let mut cursor = 0usize;

    for (index, raw) in raw_chunks.into_iter().enumerate() {
        let entry: AgenticChunkEntry = serde_json::from_value(raw)
            .map_err(|_| RagError::Validation("Agentic chunk entry is malformed".into()))?;

        let chunk_text = entry
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RagError::Validation("Agentic chunk text is missing".into()))?;

        let chunk_chars: Vec<char> = chunk_text.chars().collect();
        let start = find_chars_from(&text_chars, &chunk_chars, cursor).unwrap_or(cursor);
        let end = start + chunk_chars.len();

        chunks.push(ChunkCandidate {
            chunk_index: index as i64,
            start_char: start as i64,
            end_char: end as i64,
            text: chunk_text,
            rationale: entry.rationale.unwrap_or_else(|| AGENTIC_RATIONALE.to_string()),
        });
        cursor = end;
    }

    Ok(chunks)
}

fn find_chars_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    let from = from.min(haystack.len());
    if needle.is_empty() {
        return Some(from);
    }
    if needle.len() > haystack.len() - from {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|i| i + from)
}
