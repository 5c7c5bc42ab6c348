//! RAG Orchestrator binary (spec §6, §4.8): retrieval + generation over
//! stateless and session-scoped chat, plain and reranked, batch and
//! streamed.

use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rag_suite::clients::{OllamaInferenceClient, QdrantVectorStore, RerankerClient, VectorStore};
use rag_suite::config::{init_tracing, OrchestratorConfig};
use rag_suite::http::rag_routes::{self, RagState};
use rag_suite::http::session_routes::{self, SessionState};
use rag_suite::operations::OperationRegistry;
use rag_suite::orchestrator::ChatService;
use rag_suite::prompts::PromptStore;
use rag_suite::session::SessionStore;
use rag_suite::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OrchestratorConfig::parse();
    init_tracing(&config.shared.log_format);

    let storage = Storage::open(&config.control_db_path())?;
    let checkpoint_storage = Storage::open(&config.checkpoint_db_path())?;
    let sessions = SessionStore::new(Storage::open(&config.sessions_db_path())?);

    let vector_store: Arc<dyn VectorStore> =
        Arc::new(QdrantVectorStore::new(&config.shared.qdrant_url, config.shared.upstream_timeout()));
    let inference = OllamaInferenceClient::new(&config.shared.ollama_url, config.shared.upstream_timeout());
    let reranker = Some(RerankerClient::new(&config.shared.reranker_api_url, config.shared.upstream_timeout()));
    let prompts = PromptStore::load_dir(&config.prompts_dir)?;
    let operations = OperationRegistry::new();

    let chat = ChatService::new(storage, checkpoint_storage, vector_store, inference, reranker, prompts, sessions.clone(), operations);

    let rag_state = RagState {
        chat,
        default_chat_model: config.chat_model.clone(),
        default_embedding_model: config.embedding_model.clone(),
        default_rerank_model: config.rerank_model.clone(),
        default_history_window: config.shared.rag_default_history_window_messages,
    };
    let session_state = SessionState { sessions };

    let app = rag_routes::router(rag_state)
        .merge(session_routes::router(session_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("rag-orchestrator listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
