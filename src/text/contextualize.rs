//! Contextual header generation (spec §4.4): a short header prepended to
//! each chunk before embedding, improving retrieval locality.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::clients::ollama_client::{ChatMessage, OllamaInferenceClient};
use crate::error::Result;
use crate::operations::CancelToken;
use crate::prompts::PromptStore;
use crate::text::chunk::ChunkCandidate;

static THINKING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<thinking>.*?</thinking>").unwrap());
static THINKING_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?thinking>").unwrap());

/// Strips `<thinking>...</thinking>` reasoning blocks (and any stray
/// open/close tags) from model output.
pub fn strip_thinking_sections(text: &str) -> String {
    let without_blocks = THINKING_BLOCK.replace_all(text, "");
    let without_tags = THINKING_TAG.replace_all(&without_blocks, "");
    without_tags.trim().to_string()
}

#[derive(Debug, Clone)]
pub struct ContextualizedChunk {
    pub chunk_index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub rationale: String,
    pub chunk_text: String,
    pub context_header: String,
    pub contextualized_text: String,
}

fn template_header(document_name: &str, chunk_index: i64) -> String {
    format!("Document '{document_name}', chunk {}.", chunk_index + 1)
}

/// Generates contextual headers in `llm` or `template` mode. Honors
/// `cancel` between chunks and within an in-flight LLM call.
pub async fn contextualize(
    client: &OllamaInferenceClient,
    prompts: &PromptStore,
    cancel: &CancelToken,
    document_name: &str,
    full_document_text: &str,
    chunks: &[ChunkCandidate],
    mode: ContextualizationTarget,
) -> Result<Vec<ContextualizedChunk>> {
    let mut out = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        cancel.check()?;

        let header = match &mode {
            ContextualizationTarget::Llm { model } => {
                generate_llm_header(client, prompts, cancel, model, document_name, full_document_text, &chunk.text)
                    .await?
            }
            ContextualizationTarget::Template => template_header(document_name, chunk.chunk_index),
        };

        let contextualized_text = format!("{header}\n\n{}", chunk.text).trim().to_string();

        out.push(ContextualizedChunk {
            chunk_index: chunk.chunk_index,
            start_char: chunk.start_char,
            end_char: chunk.end_char,
            rationale: chunk.rationale.clone(),
            chunk_text: chunk.text.clone(),
            context_header: header,
            contextualized_text,
        });
    }

    Ok(out)
}

pub enum ContextualizationTarget {
    Llm { model: String },
    Template,
}

async fn generate_llm_header(
    client: &OllamaInferenceClient,
    prompts: &PromptStore,
    cancel: &CancelToken,
    model: &str,
    document_name: &str,
    full_document_text: &str,
    chunk_text: &str,
) -> Result<String> {
    let system_prompt = prompts.get("contextual_chunk_header.md")?;
    let user_prompt = format!(
        "DOCUMENT NAME: {document_name}\n\nFULL DOCUMENT:\n{full_document_text}\n\nTARGET CHUNK:\n{chunk_text}\n\n\
         Return only the contextual header sentence(s)."
    );

    let messages = vec![
        ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
        ChatMessage { role: "user".to_string(), content: user_prompt },
    ];

    let completion = client.chat(model, &messages, 0.0, None, cancel).await?;
    Ok(strip_thinking_sections(&completion.content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_thinking_block() {
        let input = "<thinking>reasoning here</thinking>Header text.";
        assert_eq!(strip_thinking_sections(input), "Header text.");
    }

    #[test]
    fn template_header_is_one_indexed() {
        assert_eq!(template_header("Doc", 0), "Document 'Doc', chunk 1.");
    }

    #[test]
    fn contextualized_text_joins_header_and_chunk() {
        let header = "A header.";
        let chunk_text = "Chunk body.";
        let joined = format!("{header}\n\n{chunk_text}").trim().to_string();
        assert_eq!(joined, "A header.\n\nChunk body.");
    }
}
