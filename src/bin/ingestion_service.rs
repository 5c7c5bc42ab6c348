//! Ingestion Service binary (spec §6): owns the control-plane database,
//! the normalize/chunk/contextualize pipeline, and document ingestion.

use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rag_suite::clients::{OllamaInferenceClient, QdrantVectorStore, VectorStore};
use rag_suite::config::{init_tracing, IngestionConfig};
use rag_suite::http::ingestion_routes::{self, IngestionState};
use rag_suite::ingestion::IngestionService;
use rag_suite::operations::OperationRegistry;
use rag_suite::prompts::PromptStore;
use rag_suite::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngestionConfig::parse();
    init_tracing(&config.shared.log_format);

    let storage = Storage::open(&config.db_path())?;
    let vector_store: Arc<dyn VectorStore> =
        Arc::new(QdrantVectorStore::new(&config.shared.qdrant_url, config.shared.upstream_timeout()));
    let inference = OllamaInferenceClient::new(&config.shared.ollama_url, config.shared.upstream_timeout());
    let prompts = PromptStore::load_dir(&config.prompts_dir)?;

    let service = IngestionService::new(
        storage,
        vector_store,
        inference.clone(),
        prompts.clone(),
        config.shared.qdrant_collection_prefix.clone(),
        config.chat_model.clone(),
        config.embedding_model.clone(),
    );

    let state = IngestionState {
        service,
        inference,
        prompts,
        operations: OperationRegistry::new(),
        default_chat_model: config.chat_model.clone(),
    };

    let app = ingestion_routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("ingestion-service listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
