//! The retrieve -> generate pipeline (spec §4.8, Design Notes §9): a
//! plain in-memory reducer over two typed node functions rather than a
//! graph-execution framework. Grounded in `rag_graph_service.py`, minus
//! its LangGraph scaffolding.

use crate::clients::ollama_client::{ChatMessage, OllamaInferenceClient};
use crate::clients::RerankerClient;
use crate::error::{RagError, Result};
use crate::operations::CancelToken;
use crate::orchestrator::context::build_retrieval_context;
use crate::orchestrator::retrieval::{retrieve, RetrievalOutcome, RetrievalRequest};
use crate::prompts::PromptStore;
use crate::storage::Storage;
use crate::types::{ChatMessage as DomainMessage, MessageRole, SourceChunk, SourceDocument};
use crate::clients::vector_store::VectorStore;

/// Inputs the retrieve node needs from the caller.
pub struct RetrieveInput<'a> {
    pub project_id: &'a str,
    pub query: &'a str,
    pub document_ids: &'a [String],
    pub top_k: usize,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
    pub dense_weight: f64,
    pub embedding_model: &'a str,
    pub rerank_model: Option<&'a str>,
    pub rerank_candidate_count: usize,
}

/// Output of the retrieve node: final ranked sources (after an optional
/// rerank pass) and their document-level aggregation.
pub struct RetrieveOutput {
    pub sources: Vec<SourceChunk>,
    pub documents: Vec<SourceDocument>,
    pub hybrid_candidates: Vec<crate::types::HybridCandidateChunk>,
    pub resolved_rerank_model: Option<String>,
}

/// Runs the retrieve node: hybrid retrieval, then an optional rerank pass
/// that reorders `sources` and records per-row `rerank_score`/`original_rank`.
/// The rerank pass is an RPC to the dedicated reranker service, never an
/// in-process call (spec §4.7: "the orchestrator invokes the reranker as
/// an RPC").
pub async fn retrieve_node(
    storage: &Storage,
    vector_store: &dyn VectorStore,
    inference: &OllamaInferenceClient,
    reranker: Option<&RerankerClient>,
    input: RetrieveInput<'_>,
) -> Result<RetrieveOutput> {
    let reranking = reranker.is_some() && input.rerank_model.is_some();
    let hybrid_top_k = if reranking { input.top_k.max(input.rerank_candidate_count) } else { input.top_k };

    let RetrievalOutcome { hybrid_candidates, documents } = retrieve(
        storage,
        vector_store,
        inference,
        RetrievalRequest {
            project_id: input.project_id,
            query: input.query,
            document_ids: input.document_ids,
            top_k: hybrid_top_k,
            dense_top_k: input.dense_top_k,
            sparse_top_k: input.sparse_top_k,
            dense_weight: input.dense_weight,
            embedding_model: input.embedding_model,
        },
    )
    .await?;

    let mut sources: Vec<SourceChunk> = hybrid_candidates
        .iter()
        .map(|c| SourceChunk {
            rank: c.rank,
            source_id: c.source_id.clone(),
            chunk_key: c.chunk_key.clone(),
            document_id: c.document_id.clone(),
            document_name: c.document_name.clone(),
            chunk_index: c.chunk_index,
            context_header: c.context_header.clone(),
            text: c.text.clone(),
            dense_score: c.dense_score,
            sparse_score: c.sparse_score,
            hybrid_score: c.hybrid_score,
            original_rank: c.rank,
            rerank_score: c.hybrid_score,
        })
        .collect();

    let resolved_rerank_model = match (reranker, input.rerank_model) {
        (Some(client), Some(model)) if !sources.is_empty() => {
            let documents: Vec<String> = sources.iter().map(|s| s.text.clone()).collect();
            let top_n = input.top_k.min(documents.len());
            let run = client.rerank(model, input.query, &documents, Some(top_n)).await?;

            if run.results.is_empty() {
                // Reranker returned nothing usable; fall back to hybrid order
                // rather than dropping every retrieved source.
                for source in sources.iter_mut() {
                    source.rerank_score = 0.0;
                }
            } else {
                for row in &run.results {
                    sources[row.index].rerank_score = row.relevance_score;
                }
                let reordered: Vec<SourceChunk> = run.results.iter().map(|row| sources[row.index].clone()).collect();
                sources = reordered;
                for (new_rank, source) in sources.iter_mut().enumerate() {
                    source.rank = new_rank as i64 + 1;
                    source.source_id = format!("S{}", new_rank + 1);
                }
            }
            Some(run.resolved_model)
        }
        _ => None,
    };

    Ok(RetrieveOutput { sources, documents, hybrid_candidates, resolved_rerank_model })
}

/// Splits `history` into the carried-over window and the current user
/// question (the last `user`-role message). Grounded in
/// `rag_graph_service.py::_split_history_and_current_question`.
pub fn split_history_and_current_question(
    history: &[DomainMessage],
    history_window: usize,
) -> (Vec<DomainMessage>, String) {
    let current_question = history
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let current_index = history.iter().rposition(|m| m.role == MessageRole::User);
    let prior = match current_index {
        Some(idx) => &history[..idx],
        None => &history[..],
    };

    let window = if history_window == 0 {
        Vec::new()
    } else {
        prior.iter().rev().take(history_window).rev().cloned().collect()
    };

    (window, current_question)
}

fn resolve_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

/// Builds the OpenAI-shaped message list for a chat completion call:
/// `[system, ...history_window, user(question + retrieved_context)]`.
/// Grounded in `rag_graph_service.py::_generate_node`/`_to_openai_messages`.
pub fn build_chat_messages(
    prompts: &PromptStore,
    history_window: &[DomainMessage],
    question: &str,
    sources: &[SourceChunk],
) -> Result<Vec<ChatMessage>> {
    let system_prompt = prompts.get("hybrid_rag_system.md")?;
    let retrieved_context = build_retrieval_context(sources);
    let user_prompt = prompts.render(
        "hybrid_rag_user.md",
        &[("question", question), ("retrieved_context", &retrieved_context)],
    )?;

    let mut messages = vec![ChatMessage { role: "system".to_string(), content: system_prompt.to_string() }];
    for message in history_window {
        messages.push(ChatMessage { role: resolve_role(message.role).to_string(), content: message.content.clone() });
    }
    messages.push(ChatMessage { role: "user".to_string(), content: user_prompt });

    Ok(messages)
}

/// Runs the generate node: calls the chat model with the assembled
/// message list and returns the raw answer text (citation handling and
/// `<thinking>` stripping happen in the caller).
pub async fn generate_node(
    inference: &OllamaInferenceClient,
    cancel: &CancelToken,
    model: &str,
    messages: &[ChatMessage],
) -> Result<String> {
    if messages.is_empty() {
        return Err(RagError::Domain("cannot generate from an empty message list".into()));
    }
    let completion = inference.chat(model, messages, 0.2, None, cancel).await?;
    Ok(completion.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: MessageRole, content: &str) -> DomainMessage {
        DomainMessage { role, content: content.to_string() }
    }

    #[test]
    fn splits_last_user_message_as_current_question() {
        let history = vec![
            message(MessageRole::User, "first"),
            message(MessageRole::Assistant, "reply"),
            message(MessageRole::User, "second"),
        ];
        let (window, question) = split_history_and_current_question(&history, 8);
        assert_eq!(question, "second");
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn zero_history_window_drops_all_carryover() {
        let history = vec![message(MessageRole::User, "first"), message(MessageRole::User, "second")];
        let (window, question) = split_history_and_current_question(&history, 0);
        assert!(window.is_empty());
        assert_eq!(question, "second");
    }

    #[test]
    fn history_window_caps_prior_messages() {
        let history = vec![
            message(MessageRole::User, "q1"),
            message(MessageRole::Assistant, "a1"),
            message(MessageRole::User, "q2"),
            message(MessageRole::Assistant, "a2"),
            message(MessageRole::User, "q3"),
        ];
        let (window, question) = split_history_and_current_question(&history, 2);
        assert_eq!(question, "q3");
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "q2");
        assert_eq!(window[1].content, "a2");
    }
}
